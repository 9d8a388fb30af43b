//! Configuration access port trait.

/// Read-only view of sectioned key/value settings.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Integer value, or `None` when the key is absent.
    ///
    /// A present but non-numeric value is an error.
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, String>;
}
