use crate::data::{X, Xs};

/// A loaded model able to run a forward pass.
///
/// One instance lives inside each scoring worker and is never shared, so
/// implementations may keep mutable session state.
pub trait InferenceBackend: Send {
    /// Runs the model over a stacked `[B, C, H, W]` batch and returns the native
    /// output of each image, in batch order.
    fn forward(&mut self, batch: &X) -> anyhow::Result<Vec<Xs>>;

    /// Class names known to the model, indexed by class id.
    fn class_names(&self) -> Option<&[String]> {
        None
    }

    fn describe(&self) -> String;
}
