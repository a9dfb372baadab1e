use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

/// Query string parameters. Clients disagree on `recipeId` versus
/// `recipe_id`, so lookups try both spellings. Blank values count as absent.
#[derive(Debug, Default)]
pub struct QueryParams {
    map: HashMap<String, String>,
}

impl<'de> Deserialize<'de> for QueryParams {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = HashMap::<String, String>::deserialize(deserializer)?;
        Ok(QueryParams { map })
    }
}

impl QueryParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        let val = match self.map.get(key) {
            Some(val) => Some(val),
            None => self.map.get(&snake_case(key)),
        };
        val.map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// First of `keys` that is present.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// A bare `?featured` or any value except `false`/`0` switches a flag on.
    pub fn flag(&self, key: &str) -> bool {
        match self.map.get(key) {
            Some(val) => !matches!(val.trim().to_ascii_lowercase().as_str(), "false" | "0"),
            None => false,
        }
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
