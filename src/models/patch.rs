use serde::{Deserialize, Deserializer};

/// One field of a partial update: absent from the request body means
/// `Unset`, present (including an explicit `null` for optional fields)
/// means `Set`. Use with `#[serde(default)]` on the containing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            Patch::Unset => None,
        }
    }

    /// Overwrite `target` only when this field was supplied.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Update {
        #[serde(default)]
        name: Patch<String>,
        #[serde(default)]
        note: Patch<Option<String>>,
    }

    #[test]
    fn absent_field_is_unset() {
        let update: Update = serde_json::from_str("{}").unwrap();
        assert_eq!(update.name, Patch::Unset);
        assert_eq!(update.note, Patch::Unset);
    }

    #[test]
    fn explicit_null_sets_none() {
        let update: Update = serde_json::from_str(r#"{"note":null}"#).unwrap();
        assert_eq!(update.note, Patch::Set(None));
        assert!(!update.name.is_set());
    }

    #[test]
    fn apply_only_overwrites_set_fields() {
        let mut name = "old".to_string();
        Patch::Unset.apply_to(&mut name);
        assert_eq!(name, "old");
        Patch::Set("new".to_string()).apply_to(&mut name);
        assert_eq!(name, "new");
    }
}
