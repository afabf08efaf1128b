//! The named parameter store the host writes and every node reads.
//!
//! Values are a tagged union; lookups are typed and coercion-free, so a
//! mis-typed stored value falls back to the caller's default. Triggers are
//! single-frame string tokens: nodes emit them during evaluation, the
//! driver hands them to the host and feeds them back into the map for the
//! next frame, where boolean lookups see them as `true`.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A dynamically typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Quat(Quat),
    Mat4(Mat4),
    String(String),
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}
impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value)
    }
}
impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Float(value)
    }
}
impl From<Vec3> for Variant {
    fn from(value: Vec3) -> Self {
        Variant::Vec3(value)
    }
}
impl From<Quat> for Variant {
    fn from(value: Quat) -> Self {
        Variant::Quat(value)
    }
}
impl From<Mat4> for Variant {
    fn from(value: Mat4) -> Self {
        Variant::Mat4(value)
    }
}
impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}
impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

/// Map from string key to [`Variant`], plus the trigger set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantMap {
    map: HashMap<String, Variant>,
    triggers: HashSet<String>,
}

impl VariantMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Variant>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) {
        self.map.remove(key);
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// An empty key always yields the default; triggers read as `true`.
    pub fn lookup_bool(&self, key: &str, default: bool) -> bool {
        if key.is_empty() {
            default
        } else if self.triggers.contains(key) {
            true
        } else {
            match self.map.get(key) {
                Some(Variant::Bool(value)) => *value,
                _ => default,
            }
        }
    }

    pub fn lookup_int(&self, key: &str, default: i32) -> i32 {
        match self.map.get(key) {
            Some(Variant::Int(value)) if !key.is_empty() => *value,
            _ => default,
        }
    }

    pub fn lookup_float(&self, key: &str, default: f32) -> f32 {
        match self.map.get(key) {
            Some(Variant::Float(value)) if !key.is_empty() => *value,
            _ => default,
        }
    }

    pub fn lookup_vec3(&self, key: &str, default: Vec3) -> Vec3 {
        match self.map.get(key) {
            Some(Variant::Vec3(value)) if !key.is_empty() => *value,
            _ => default,
        }
    }

    pub fn lookup_quat(&self, key: &str, default: Quat) -> Quat {
        match self.map.get(key) {
            Some(Variant::Quat(value)) if !key.is_empty() => *value,
            _ => default,
        }
    }

    pub fn lookup_mat4(&self, key: &str, default: Mat4) -> Mat4 {
        match self.map.get(key) {
            Some(Variant::Mat4(value)) if !key.is_empty() => *value,
            _ => default,
        }
    }

    pub fn lookup_string(&self, key: &str, default: &str) -> String {
        match self.map.get(key) {
            Some(Variant::String(value)) if !key.is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }

    pub fn set_trigger(&mut self, key: impl Into<String>) {
        self.triggers.insert(key.into());
    }

    pub fn has_trigger(&self, key: &str) -> bool {
        self.triggers.contains(key)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().map(String::as_str)
    }

    pub fn clear_triggers(&mut self) {
        self.triggers.clear();
    }

    /// Remove and return the accumulated trigger set.
    pub fn take_triggers(&mut self) -> HashSet<String> {
        std::mem::take(&mut self.triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_return_stored_values() {
        let mut vars = VariantMap::new();
        vars.set("speed", 1.5f32);
        vars.set("count", 3i32);
        vars.set("enabled", true);
        vars.set("target", Vec3::new(1.0, 2.0, 3.0));
        vars.set("state", "walk");

        assert_eq!(vars.lookup_float("speed", 0.0), 1.5);
        assert_eq!(vars.lookup_int("count", 0), 3);
        assert!(vars.lookup_bool("enabled", false));
        assert_eq!(vars.lookup_vec3("target", Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vars.lookup_string("state", "idle"), "walk");
    }

    #[test]
    fn missing_or_empty_keys_yield_defaults() {
        let vars = VariantMap::new();
        assert_eq!(vars.lookup_float("missing", 7.0), 7.0);
        assert_eq!(vars.lookup_float("", 7.0), 7.0);
        assert!(!vars.lookup_bool("missing", false));
    }

    #[test]
    fn mistyped_values_yield_defaults() {
        let mut vars = VariantMap::new();
        vars.set("speed", "fast"); // a string where a float is expected
        assert_eq!(vars.lookup_float("speed", 2.0), 2.0);
        assert_eq!(vars.lookup_int("speed", -1), -1);
        // no implicit numeric coercion either
        vars.set("count", 3i32);
        assert_eq!(vars.lookup_float("count", 0.5), 0.5);
    }

    #[test]
    fn triggers_read_as_true_booleans() {
        let mut vars = VariantMap::new();
        vars.set_trigger("clipOnDone");
        assert!(vars.lookup_bool("clipOnDone", false));
        assert!(vars.has_trigger("clipOnDone"));
        vars.clear_triggers();
        assert!(!vars.lookup_bool("clipOnDone", false));
    }

    #[test]
    fn take_triggers_drains_the_set() {
        let mut vars = VariantMap::new();
        vars.set_trigger("a");
        vars.set_trigger("b");
        let taken = vars.take_triggers();
        assert_eq!(taken.len(), 2);
        assert!(vars.triggers().next().is_none());
    }

    #[test]
    fn unset_removes_keys() {
        let mut vars = VariantMap::new();
        vars.set("speed", 1.0f32);
        assert!(vars.has_key("speed"));
        vars.unset("speed");
        assert!(!vars.has_key("speed"));
    }
}
