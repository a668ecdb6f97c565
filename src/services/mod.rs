// Product intake
pub mod bundles;
pub mod products;

// Sale recording
pub mod sales;

/// Accepts `"40"`, `40` or `40.5` where a label is expected; forms send sizes
/// either way.
pub(crate) mod lenient_string {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn to_label<E: serde::de::Error>(value: Value) -> Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(E::custom(format!("expected a string or number, got {}", other))),
        }
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        to_label(Value::deserialize(deserializer)?)
    }

    pub fn vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Vec<Value> = Vec::deserialize(deserializer)?;
        let mut labels = Vec::with_capacity(values.len());
        for value in values {
            if let Some(label) = to_label(value)? {
                labels.push(label);
            }
        }
        Ok(labels)
    }
}
