//! EnergyPlus input data file (IDF) support: the text format, the class
//! layouts this crate reads and writes, and the model codec.

mod classes;
mod decode;
mod encode;
pub mod templates;
mod text;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use classes::{class_def, is_typed_class, ClassDef, ClassKind, CLASSES};
pub use decode::{decode, decode_as};
pub use encode::{encode, IDF_VERSION};

/// One IDF object: a class name followed by positional fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdfObject {
    pub class: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl IdfObject {
    pub fn new<S: Into<String>>(class: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        IdfObject {
            class: class.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Class names are case insensitive.
    pub fn is(&self, class: &str) -> bool {
        self.class.eq_ignore_ascii_case(class)
    }

    pub fn definition(&self) -> Option<&'static ClassDef> {
        class_def(&self.class)
    }

    /// First field, which names the object for most classes.
    pub fn name(&self) -> &str {
        self.fields.first().map_or("", String::as_str)
    }

    /// Field by position; blank fields read as `None`.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(String::as_str)
            .filter(|field| !field.is_empty())
    }

    /// Field by its label in the class layout.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.definition()
            .and_then(|definition| definition.index_of(label))
            .and_then(|index| self.field(index))
    }

    /// Label of the field at `index` for the pretty printer.
    pub fn label(&self, index: usize) -> String {
        match self.definition() {
            Some(definition) => definition.label(index),
            None => format!("Field {}", index + 1),
        }
    }
}

/// Ordered list of objects; order is significant for emission only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdfDocument {
    pub objects: Vec<IdfObject>,
}

impl IdfDocument {
    pub fn objects_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a IdfObject> + 'a {
        self.objects.iter().filter(move |object| object.is(class))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IdfError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{class} {name:?}: {field} is missing")]
    MissingField {
        class: String,
        name: String,
        field: String,
    },

    #[error("{class} {name:?}: {field} {value:?} is not a number")]
    BadNumber {
        class: String,
        name: String,
        field: String,
        value: String,
    },

    #[error("{class} {name:?}: {field} {value:?} is not supported")]
    Unsupported {
        class: String,
        name: String,
        field: String,
        value: String,
    },

    #[error("{class} {name:?} is defined more than once")]
    Duplicate { class: String, name: String },
}
