//! TVBox per-provider protocol: query parameters and action routing.

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Query string of `/spider/{key}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolQuery {
    pub act: Option<String>,
    pub t: Option<String>,
    pub pg: Option<String>,
    pub wd: Option<String>,
    /// Legacy filter parameter
    pub fl: Option<String>,
    /// Structured filter parameter, preferred over `fl`
    pub extend: Option<String>,
    pub flag: Option<String>,
}

impl ProtocolQuery {
    pub fn page(&self) -> &str {
        self.pg.as_deref().filter(|pg| !pg.is_empty()).unwrap_or("1")
    }

    pub fn flag(&self) -> &str {
        self.flag.as_deref().unwrap_or_default()
    }

    pub fn action(&self) -> Action {
        Action::from_query(self.act.as_deref())
    }

    /// Filter payload for category listings.
    ///
    /// `extend` wins over `fl`. A payload that is not a JSON object falls
    /// back to `{"fl": <fl>}`; no payload at all yields `{}`.
    pub fn filter(&self) -> Value {
        let Some(raw) = self.extend.as_deref().or(self.fl.as_deref()) else {
            return Value::Object(Map::new());
        };
        if raw.is_empty() {
            return Value::Object(Map::new());
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            _ => json!({ "fl": self.fl }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Home listing with filter definitions
    Home,
    /// Home listing without filters
    HomeV2,
    Category,
    Detail,
    Search,
    Play,
}

impl Action {
    /// Absent or unrecognized actions fall back to `Home`
    pub fn from_query(act: Option<&str>) -> Self {
        match act {
            Some("homev2") => Self::HomeV2,
            Some("category") => Self::Category,
            Some("detail") => Self::Detail,
            Some("search") => Self::Search,
            Some("play") => Self::Play,
            _ => Self::Home,
        }
    }
}
