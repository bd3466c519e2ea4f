use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name under which the id travels when a record is serialized.
pub const ID_FIELD: &str = "id";

/// The unit stored in a metadata collection: an id and a flat map of fields.
///
/// The id is kept outside the field map, so `fields` never contains
/// [`ID_FIELD`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: Map::new() }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Keep only the named fields. The id is always kept.
    pub fn project(mut self, fields: &[String]) -> Self {
        self.fields.retain(|key, _| fields.iter().any(|f| f == key));
        self
    }

    /// Serialize any struct with a string `id` field into a document.
    ///
    /// `null` values are dropped, so an unset optional field and a missing
    /// field look the same once stored.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let Value::Object(mut fields) = serde_json::to_value(value).or_raise(|| ErrorKind::InvalidData("record"))? else {
            exn::bail!(ErrorKind::InvalidData("record is not a map"));
        };
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => exn::bail!(ErrorKind::InvalidData("record id")),
        };
        fields.retain(|_, value| !value.is_null());
        Ok(Self { id, fields })
    }

    /// Deserialize the document back into a typed record.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_value()).or_raise(|| ErrorKind::InvalidData("record"))
    }

    /// Flat JSON object with the id under [`ID_FIELD`].
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert(ID_FIELD.to_string(), Value::String(self.id));
        Value::Object(fields)
    }

    /// Parse a stored JSON body for the given id.
    pub(crate) fn from_body(id: String, body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).or_raise(|| ErrorKind::InvalidData("document body"))?;
        let Value::Object(fields) = value else {
            exn::bail!(ErrorKind::InvalidData("document body is not a map"));
        };
        Ok(Self { id, fields })
    }

    pub(crate) fn body(&self) -> Result<String> {
        serde_json::to_string(&self.fields).or_raise(|| ErrorKind::InvalidData("document body"))
    }
}

/// A typed record that can be stored as a [`Document`].
///
/// The default methods go through serde, which is all most records need.
/// Records with fields that do not map cleanly onto JSON can override them.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> &str;

    fn to_document(&self) -> Result<Document> {
        Document::from_serialize(self)
    }

    fn from_document(document: Document) -> Result<Self> {
        document.deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        id: String,
        page_id: Option<String>,
        size: Option<(u32, u32)>,
    }
    impl Record for Page {
        fn id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_record_to_document() {
        let page = Page { id: "p1".to_string(), page_id: None, size: Some((1240, 1754)) };
        let document = page.to_document().unwrap();
        assert_eq!(document.id, "p1");
        assert_eq!(document.get("size"), Some(&json!([1240, 1754])));
        assert!(document.get("page_id").is_none());
        assert!(document.get(ID_FIELD).is_none());
        assert_eq!(Page::from_document(document).unwrap(), page);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let err = Document::from_serialize(&json!({"page_id": "x"})).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("record id"));
        let err = Document::from_serialize(&json!(["p1"])).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("record is not a map"));
    }

    #[test]
    fn test_project_keeps_id() {
        let document = Document::new("p1").with_field("a", 1).with_field("b", 2).project(&["b".to_string()]);
        assert_eq!(document.id, "p1");
        assert_eq!(document.fields.len(), 1);
        assert_eq!(document.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_body_must_be_a_map() {
        assert!(Document::from_body("p1".to_string(), r#"{"a":1}"#).is_ok());
        let err = Document::from_body("p1".to_string(), "[1]").unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("document body is not a map"));
    }
}
