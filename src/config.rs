use std::{
    num::ParseIntError,
    path::{Path, PathBuf},
    time::Duration,
};

use ini::Ini;
use log::info;
use tlc_attendance_utils::{
    credentials::Email,
    fs_ini_util::{read_ini_or_default, write_ini},
};

use crate::{browser::BrowserKind, prompt::Prompter};

pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Where a key lives in the config file.
#[derive(Clone, Copy, Debug)]
enum Section {
    Default,
    /// The section named after the configured server.
    Server,
}

#[derive(Debug)]
struct ConfigKey {
    section: Section,
    name: &'static str,
    prompt: &'static str,
    default: &'static str,
}

const SERVER: ConfigKey = ConfigKey {
    section: Section::Default,
    name: "server",
    prompt: "Trail Life Connect website: ",
    default: "www.traillifeconnect.com",
};
const BROWSER: ConfigKey = ConfigKey {
    section: Section::Default,
    name: "browser",
    prompt: "Web browser to use (Firefox, Chrome, Edge): ",
    default: "Firefox",
};
const SHEET_NAME: ConfigKey = ConfigKey {
    section: Section::Default,
    name: "sheetName",
    prompt: "Attendance sheet name: ",
    default: "Attendance",
};
const EMAIL: ConfigKey = ConfigKey {
    section: Section::Server,
    name: "email",
    prompt: "Trail Life Connect username: ",
    default: "user@example.com",
};
const INITIAL_WAIT_SECS: ConfigKey = ConfigKey {
    section: Section::Server,
    name: "initial_wait_secs",
    prompt: "Time to wait for website in seconds: ",
    default: "30",
};

/// Everything the run needs from the config file, resolved once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub server: String,
    pub browser: BrowserKind,
    pub sheet_name: String,
    pub email: Email,
    pub initial_wait: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load the config file {path:?}")]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to write the config file {path:?}")]
    Save {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to read [{section}] {key} from the operator")]
    Prompt {
        section: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("[{section}] initial_wait_secs must be a whole number of seconds, found {value:?}")]
    InvalidWait {
        section: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// The on-disk INI file, kept whole so unknown keys and sections survive a rewrite.
///
/// Key names are case-insensitive and every section falls back to `[DEFAULT]`,
/// matching files written by Python's `configparser`.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    document: Ini,
    changed: bool,
}

impl ConfigFile {
    /// Loads the file, treating a missing file as empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let document = read_ini_or_default(&path).map_err(|source| ConfigError::Load {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            document,
            changed: false,
        })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        lookup(&self.document, section, key).or_else(|| {
            if section == DEFAULT_SECTION {
                None
            } else {
                lookup(&self.document, DEFAULT_SECTION, key)
            }
        })
    }

    /// Stores `value` under the lower-cased key, as `configparser` would.
    pub fn set(&mut self, section: &str, key: &str, value: String) {
        self.document
            .with_section(Some(section))
            .set(key.to_ascii_lowercase(), value);
        self.changed = true;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Writes the file back iff something was set since loading.
    pub fn save_if_changed(&mut self) -> Result<bool, ConfigError> {
        if !self.changed {
            return Ok(false);
        }
        info!("Writing changes to config file {:?}", self.path);
        write_ini(&self.path, &self.document).map_err(|source| ConfigError::Save {
            path: self.path.clone(),
            source,
        })?;
        self.changed = false;
        Ok(true)
    }

    /// Returns the stored value, or asks the operator and records the answer.
    fn resolve_key(
        &mut self,
        section: &str,
        key: &ConfigKey,
        prompter: &mut impl Prompter,
    ) -> Result<String, ConfigError> {
        if let Some(value) = self.get(section, key.name) {
            return Ok(value.to_owned());
        }
        info!("Config file missing [{section}] {}", key.name);
        let answer = prompter
            .ask(key.prompt, key.default)
            .map_err(|source| ConfigError::Prompt {
                section: section.to_owned(),
                key: key.name.to_owned(),
                source,
            })?;
        let value = answer.unwrap_or_else(|| {
            info!(
                "No value provided for [{section}] {}, using {}",
                key.name, key.default
            );
            key.default.to_owned()
        });
        self.set(section, key.name, value.clone());
        Ok(value)
    }
}

fn lookup<'a>(document: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    document
        .section(Some(section))?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

/// Builds [`Settings`] from the config file at `path`, prompting for missing keys.
///
/// The file is rewritten only when at least one key had to be asked for.
pub fn resolve(path: &Path, prompter: &mut impl Prompter) -> Result<Settings, ConfigError> {
    let mut file = ConfigFile::load(path)?;
    let mut ask = |file: &mut ConfigFile, server: &str, key: &ConfigKey| {
        let section = match key.section {
            Section::Default => DEFAULT_SECTION,
            Section::Server => server,
        };
        file.resolve_key(section, key, &mut *prompter)
    };

    let server = ask(&mut file, DEFAULT_SECTION, &SERVER)?;
    let browser = ask(&mut file, &server, &BROWSER)?;
    let sheet_name = ask(&mut file, &server, &SHEET_NAME)?;
    let email = ask(&mut file, &server, &EMAIL)?;
    let initial_wait = ask(&mut file, &server, &INITIAL_WAIT_SECS)?;

    file.save_if_changed()?;

    let initial_wait = initial_wait
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidWait {
            section: server.clone(),
            value: initial_wait.clone(),
            source,
        })?;
    Ok(Settings {
        browser: BrowserKind::from_config(&browser),
        sheet_name,
        email: email.into(),
        initial_wait: Duration::from_secs(initial_wait),
        server,
    })
}

#[cfg(test)]
mod tests {
    use std::{env, path::PathBuf, process, time::Duration};

    use crate::{browser::BrowserKind, prompt::scripted::ScriptedPrompter};

    use super::{resolve, ConfigError, ConfigFile};

    fn temp_config(name: &str, contents: Option<&str>) -> PathBuf {
        let path = env::temp_dir().join(format!("tlc-config-{}-{name}.ini", process::id()));
        match contents {
            Some(contents) => fs_err::write(&path, contents).unwrap(),
            None => {
                let _ = fs_err::remove_file(&path);
            }
        }
        path
    }

    const COMPLETE: &str = "# hand-written
[DEFAULT]
server = tlc.example.org
browser = Chrome
sheetName = Roll

[tlc.example.org]
email = leader@example.org
initial_wait_secs = 12
";

    #[test]
    fn complete_file_is_used_without_prompting_or_rewriting() {
        let path = temp_config("complete", Some(COMPLETE));
        let mut prompter = ScriptedPrompter::default();
        let settings = resolve(&path, &mut prompter).unwrap();

        assert!(prompter.asked.is_empty());
        assert_eq!(settings.server, "tlc.example.org");
        assert_eq!(settings.browser, BrowserKind::Chrome);
        assert_eq!(settings.sheet_name, "Roll");
        assert_eq!(settings.email.to_string(), "leader@example.org");
        assert_eq!(settings.initial_wait, Duration::from_secs(12));
        // Untouched, comment included.
        assert_eq!(fs_err::read_to_string(&path).unwrap(), COMPLETE);
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn configparser_output_is_read_as_is() {
        // Lower-cased option names, unquoted values and a dotted section name.
        let path = temp_config(
            "configparser",
            Some(
                "[DEFAULT]
server = www.traillifeconnect.com
browser = Edge
sheetname = Attendance

[www.traillifeconnect.com]
email = me@example.org
initial_wait_secs = 30

",
            ),
        );
        let mut prompter = ScriptedPrompter::default();
        let settings = resolve(&path, &mut prompter).unwrap();

        assert!(prompter.asked.is_empty());
        assert_eq!(settings.server, "www.traillifeconnect.com");
        assert_eq!(settings.browser, BrowserKind::Edge);
        assert_eq!(settings.sheet_name, "Attendance");
        assert_eq!(settings.email.to_string(), "me@example.org");
        assert_eq!(settings.initial_wait, Duration::from_secs(30));
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn server_section_falls_back_to_default_section() {
        let path = temp_config(
            "fallthrough",
            Some(
                "[DEFAULT]
server = tlc.example.org
browser = Firefox
sheetname = Roll
initial_wait_secs = 7
EMAIL = shared@example.org
",
            ),
        );
        let mut prompter = ScriptedPrompter::default();
        let settings = resolve(&path, &mut prompter).unwrap();

        assert!(prompter.asked.is_empty());
        assert_eq!(settings.email.to_string(), "shared@example.org");
        assert_eq!(settings.initial_wait, Duration::from_secs(7));

        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.get("DEFAULT", "Email"), Some("shared@example.org"));
        assert_eq!(file.get("DEFAULT", "nonexistent"), None);
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_prompts_for_everything_and_falls_back_to_defaults() {
        let path = temp_config("missing", None);
        let mut prompter =
            ScriptedPrompter::new([Some("tlc.example.org"), None, None, Some("me@x.org"), None]);
        let settings = resolve(&path, &mut prompter).unwrap();

        assert_eq!(prompter.asked.len(), 5);
        assert_eq!(prompter.asked[0], "Trail Life Connect website: ");
        assert_eq!(settings.server, "tlc.example.org");
        assert_eq!(settings.browser, BrowserKind::Firefox);
        assert_eq!(settings.sheet_name, "Attendance");
        assert_eq!(settings.email.to_string(), "me@x.org");
        assert_eq!(settings.initial_wait, Duration::from_secs(30));

        let text = fs_err::read_to_string(&path).unwrap();
        assert!(text.contains("[tlc.example.org]"));
        assert!(text.contains("sheetname = Attendance"));
        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.get("DEFAULT", "browser"), Some("Firefox"));
        assert_eq!(file.get("tlc.example.org", "initial_wait_secs"), Some("30"));
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn only_missing_keys_are_asked_and_existing_ones_survive() {
        let path = temp_config(
            "partial",
            Some(
                "
[DEFAULT]
server = tlc.example.org
browser = Edge
sheetName = Roll
extra = kept

[tlc.example.org]
initial_wait_secs = 5
",
            ),
        );
        let mut prompter = ScriptedPrompter::new([Some("new@example.org")]);
        let settings = resolve(&path, &mut prompter).unwrap();

        assert_eq!(prompter.asked, ["Trail Life Connect username: "]);
        assert_eq!(settings.email.to_string(), "new@example.org");

        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.get("DEFAULT", "server"), Some("tlc.example.org"));
        assert_eq!(file.get("DEFAULT", "browser"), Some("Edge"));
        assert_eq!(file.get("DEFAULT", "sheetName"), Some("Roll"));
        assert_eq!(file.get("DEFAULT", "extra"), Some("kept"));
        assert_eq!(file.get("tlc.example.org", "email"), Some("new@example.org"));
        assert_eq!(file.get("tlc.example.org", "initial_wait_secs"), Some("5"));
        assert!(!file.changed());
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_browser_falls_back_to_firefox() {
        let path = temp_config(
            "safari",
            Some(&COMPLETE.replace("browser = Chrome", "browser = Safari")),
        );
        let settings = resolve(&path, &mut ScriptedPrompter::default()).unwrap();
        assert_eq!(settings.browser, BrowserKind::Firefox);
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn non_numeric_wait_is_rejected() {
        let path = temp_config(
            "badwait",
            Some(&COMPLETE.replace("initial_wait_secs = 12", "initial_wait_secs = soon")),
        );
        let err = resolve(&path, &mut ScriptedPrompter::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWait { value, .. } if value == "soon"));
        fs_err::remove_file(&path).unwrap();
    }
}
