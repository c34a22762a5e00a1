use std::collections::BTreeMap;
use image::DynamicImage;
use ndarray::ArrayD;

/// Column holding the decoded image (raw pixels before preprocessing, a tensor after).
pub const IMAGE_COLUMN: &str = "image";
/// Column holding the source file path when the image source is asked to include it.
pub const PATH_COLUMN: &str = "path";

/// A single cell of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Image(DynamicImage),
    Tensor(ArrayD<f32>),
    Text(String),
}

impl Value {
    pub fn as_image(&self) -> Option<&DynamicImage> {
        match self {
            Value::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Image(_) => "image",
            Value::Tensor(_) => "tensor",
            Value::Text(_) => "text",
        }
    }

    /// Approximate in-memory footprint, used for object store accounting.
    pub fn nbytes(&self) -> usize {
        match self {
            Value::Image(image) => image.as_bytes().len(),
            Value::Tensor(tensor) => tensor.len() * std::mem::size_of::<f32>(),
            Value::Text(text) => text.len(),
        }
    }
}

/// One row of the dataset: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: BTreeMap<String, Value>,
}

pub type Batch = Vec<Record>;

impl Record {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.insert(column, value);
        self
    }

    /// Inserts or replaces a column, returning the previous value.
    pub fn insert(&mut self, column: &str, value: Value) -> Option<Value> {
        self.columns.insert(column.to_string(), value)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Copies the named columns into a new record. Missing columns are reported by name.
    pub fn select(&self, columns: &[String]) -> Result<Record, String> {
        let mut out = Record::new();
        for column in columns {
            match self.columns.get(column) {
                Some(value) => {
                    out.insert(column, value.clone());
                }
                None => return Err(column.clone()),
            }
        }
        Ok(out)
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.get(IMAGE_COLUMN).and_then(Value::as_image)
    }

    pub fn path(&self) -> Option<&str> {
        self.get(PATH_COLUMN).and_then(Value::as_text)
    }

    pub fn nbytes(&self) -> usize {
        self.columns.iter().map(|(k, v)| k.len() + v.nbytes()).sum()
    }
}
