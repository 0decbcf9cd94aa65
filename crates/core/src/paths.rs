use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".grocerbot"))
            .unwrap_or_else(|| PathBuf::from(".grocerbot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Cookie jar of the last authenticated browser session.
    pub fn auth_state_file(&self) -> PathBuf {
        self.base.join("auth_state.json")
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.base.join("catalog.yaml")
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.base.join("prompt.txt")
    }

    pub fn browser_profile_dir(&self) -> PathBuf {
        self.base.join("browser-profile")
    }

    pub fn has_auth_state(&self) -> bool {
        self.auth_state_file().exists()
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.browser_profile_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
