use crate::types::jid::Jid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authentication material that lets a session resume without re-pairing.
///
/// Only the fields this client reads are typed; everything else the library
/// keeps in here (noise key, identity key, signed pre-key, ...) rides along
/// untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Me>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Me {
    pub id: Jid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Partial credentials announced by the library; top-level keys replace
/// the stored ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredsUpdate(pub Map<String, Value>);

impl CredsUpdate {
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Credentials {
    pub fn me_jid(&self) -> Option<&Jid> {
        self.me.as_ref().map(|me| &me.id)
    }

    pub fn apply_update(&mut self, update: &CredsUpdate) -> Result<(), serde_json::Error> {
        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in &update.0 {
            merged.insert(key.clone(), value.clone());
        }
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_merges_top_level_keys() {
        let mut creds: Credentials = serde_json::from_value(json!({
            "registered": false,
            "noiseKey": {"public": "AAA"},
            "nextPreKeyId": 31
        }))
        .unwrap();

        let update = CredsUpdate::default()
            .set("registered", true)
            .set("me", json!({"id": "15551234567:3@s.whatsapp.net", "name": "bot"}))
            .set("nextPreKeyId", 62);
        creds.apply_update(&update).unwrap();

        assert!(creds.registered);
        assert_eq!(creds.me_jid().unwrap().device, 3);
        assert_eq!(creds.extra["nextPreKeyId"], json!(62));
        assert_eq!(creds.extra["noiseKey"], json!({"public": "AAA"}));
    }

    #[test]
    fn rejects_update_with_wrong_types() {
        let mut creds = Credentials::default();
        let update = CredsUpdate::default().set("registered", "yes");
        assert!(creds.apply_update(&update).is_err());
    }
}
