use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_global_executor::spawn_blocking;
use opsin_utils::LoaderImplementation;

use crate::{Error, MimeType};

/// Version of the loader protocol this host implementation speaks
pub const COMPAT_VERSION: u8 = 1;

const CONFIG_FILE_EXT: &str = "conf";

/// Environment variable pointing to a directory with loader config files
pub const LOADERS_DIR_ENV: &str = "OPSIN_LOADERS_DIR";

type ConstructorFn = fn() -> Box<dyn LoaderImplementation>;

/// How to start a loader for one MIME type
#[derive(Clone, Default)]
pub struct ImageLoaderConfig {
    /// External loader binary, spawned as its own process
    pub exec: Option<PathBuf>,
    /// Builtin loader, run on a worker thread
    pub builtin: Option<ConstructorFn>,
}

impl std::fmt::Debug for ImageLoaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoaderConfig")
            .field("exec", &self.exec)
            .field("builtin", &self.builtin.map(|_| "<fn>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    image_loaders: HashMap<MimeType, ImageLoaderConfig>,
}

fn image_rs_loader() -> Box<dyn LoaderImplementation> {
    Box::<opsin_image_rs::ImgDecoder>::default()
}

impl Config {
    pub async fn cached() -> &'static Self {
        static CONFIG: OnceLock<Config> = OnceLock::new();

        if let Some(config) = CONFIG.get() {
            config
        } else {
            let config = spawn_blocking(Self::load).await;
            CONFIG.get_or_init(|| config)
        }
    }

    pub fn get(&self, mime_type: &str) -> Result<&ImageLoaderConfig, Error> {
        self.image_loaders
            .get(mime_type)
            .ok_or_else(|| Error::UnknownImageFormat(mime_type.to_string()))
    }

    pub fn mime_types(&self) -> Vec<MimeType> {
        let mut mime_types: Vec<MimeType> = self.image_loaders.keys().cloned().collect();
        mime_types.sort();
        mime_types
    }

    fn load() -> Config {
        let mut config = Config::default();

        for mime_type in opsin_image_rs::MIME_TYPES {
            config.image_loaders.insert(
                (*mime_type).to_string(),
                ImageLoaderConfig {
                    exec: None,
                    builtin: Some(image_rs_loader),
                },
            );
        }

        if let Some(dir) = std::env::var_os(LOADERS_DIR_ENV) {
            if let Err(err) = config.load_dir(Path::new(&dir)) {
                eprintln!("Failed to load loader configs from {dir:?}: {err}");
            }
        }

        config
    }

    fn load_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == CONFIG_FILE_EXT) {
                let data = std::fs::read_to_string(&path)?;
                if let Err(err) = self.parse_config(&data, dir) {
                    eprintln!("Invalid loader config {}: {err}", path.display());
                }
            }
        }

        Ok(())
    }

    /// Parses a loader config
    ///
    /// ```text
    /// [loader:image/png]
    /// Exec = /usr/libexec/opsin-loaders/example-png
    /// ```
    ///
    /// A file that fails to parse registers nothing, even if earlier
    /// sections were well formed.
    fn parse_config(&mut self, data: &str, base_dir: &Path) -> Result<(), String> {
        let mut parsed: HashMap<MimeType, PathBuf> = HashMap::new();
        let mut current_mime_type: Option<String> = None;

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_mime_type = section
                    .strip_prefix("loader:")
                    .map(str::to_string)
                    .or_else(|| {
                        eprintln!("Ignoring unknown config section '{section}'");
                        None
                    });
            } else if let Some((key, value)) = line.split_once('=') {
                let mime_type = current_mime_type
                    .as_ref()
                    .ok_or_else(|| String::from("Entry outside of a [loader:…] section"))?;

                if key.trim() == "Exec" {
                    parsed.insert(mime_type.clone(), base_dir.join(value.trim()));
                }
            } else {
                return Err(format!("Unparsable line '{line}'"));
            }
        }

        for (mime_type, exec) in parsed {
            self.image_loaders.entry(mime_type).or_default().exec = Some(exec);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_loaders_registered() {
        let config = Config::load();
        assert!(config.get("image/png").unwrap().builtin.is_some());
        assert!(config.get("image/jpeg").unwrap().builtin.is_some());
        assert!(matches!(
            config.get("application/pdf"),
            Err(Error::UnknownImageFormat(_))
        ));
    }

    #[test]
    fn parse_exec_entry() {
        let mut config = Config::default();
        config
            .parse_config(
                "# comment\n[loader:image/example]\nExec = example-loader\n",
                Path::new("/usr/libexec/opsin-loaders"),
            )
            .unwrap();

        let loader = config.get("image/example").unwrap();
        assert_eq!(
            loader.exec.as_deref(),
            Some(Path::new("/usr/libexec/opsin-loaders/example-loader"))
        );
    }

    #[test]
    fn reject_entry_without_section() {
        let mut config = Config::default();
        assert!(config
            .parse_config("Exec = loader\n", Path::new("/"))
            .is_err());
    }

    #[test]
    fn rejected_file_registers_nothing() {
        let mut config = Config::default();
        let result = config.parse_config(
            "[loader:image/example]\nExec = example-loader\nnot a parsable line\n",
            Path::new("/usr/libexec/opsin-loaders"),
        );

        assert!(result.is_err());
        assert!(config.get("image/example").is_err());
    }
}
