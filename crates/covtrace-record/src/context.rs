/// The test that is currently running: the file it lives in and the titles
/// of its enclosing groups followed by its own title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestContext {
    pub file_path: String,
    pub title_path: Vec<String>,
}

impl TestContext {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            title_path: Vec::new(),
        }
    }

    /// A context nested one level below this one.
    pub fn child(&self, title: impl Into<String>) -> Self {
        let mut title_path = self.title_path.clone();
        title_path.push(title.into());
        Self {
            file_path: self.file_path.clone(),
            title_path,
        }
    }

    pub fn title(&self) -> &str {
        self.title_path.last().map(String::as_str).unwrap_or_default()
    }
}
