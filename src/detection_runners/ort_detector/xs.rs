use std::collections::HashMap;
use crate::data::X;
use crate::error::DetectError;

/// Named model outputs in session output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Xs {
    map: HashMap<String, X>,
    names: Vec<String>,
}

impl Xs {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push_kv(&mut self, key: &str, value: X) -> Result<(), DetectError> {
        if self.map.contains_key(key) {
            return Err(DetectError::Format(format!("duplicate output name `{}`", key)));
        }
        self.names.push(key.to_string());
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&X> {
        self.map.get(key)
    }

    /// Output by name, or a format error naming the missing key.
    pub fn require(&self, key: &str) -> Result<&X, DetectError> {
        self.get(key).ok_or_else(|| {
            DetectError::Format(format!("model output `{}` missing, have {:?}", key, self.names))
        })
    }

    pub fn first(&self) -> Option<&X> {
        self.names.first().and_then(|n| self.map.get(n))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Splits batched outputs (leading axis `batch`) into one `Xs` per item.
    pub fn split_batch(&self, batch: usize) -> Result<Vec<Xs>, DetectError> {
        let mut items: Vec<Xs> = (0..batch).map(|_| Xs::new()).collect();
        for name in &self.names {
            let x = &self.map[name];
            if x.ndim() == 0 || x.shape()[0] != batch {
                return Err(DetectError::Format(format!(
                    "output `{}` has shape {:?}, expected leading batch axis of {}",
                    name,
                    x.shape(),
                    batch
                )));
            }
            for (item, x) in items.iter_mut().zip(x.unstack()) {
                item.push_kv(name, x)?;
            }
        }
        Ok(items)
    }
}

impl std::ops::Index<&str> for Xs {
    type Output = X;

    fn index(&self, index: &str) -> &Self::Output {
        &self.map[index]
    }
}
