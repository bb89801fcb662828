use std::{fmt::Debug, io, path::PathBuf};

use anyhow::Context;
use ini::{EscapePolicy, Ini, ParseOption, WriteOption};

/// Values are taken verbatim, as Python's `configparser` does: no quote
/// stripping and no backslash escapes.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    }
}

/// Reads an INI file, or returns an empty document if the file does not exist.
pub fn read_ini_or_default<P>(path: P) -> anyhow::Result<Ini>
where
    P: Into<PathBuf> + Debug,
{
    let path = path.into();
    let text = match fs_err::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Ini::new()),
        Err(e) => return Err(e.into()),
    };
    Ini::load_from_str_opt(&text, parse_option())
        .with_context(|| format!("While trying to parse {path:?} as an INI file"))
}

/// Writes `ini` in the `key = value` layout `configparser` produces.
pub fn write_ini<P: Into<PathBuf>>(path: P, ini: &Ini) -> anyhow::Result<()> {
    let mut buffer = vec![];
    ini.write_to_opt(
        &mut buffer,
        WriteOption {
            escape_policy: EscapePolicy::Nothing,
            kv_separator: " = ",
            ..Default::default()
        },
    )?;
    fs_err::write(path.into(), buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, path::PathBuf, process};

    use ini::Ini;

    use super::{read_ini_or_default, write_ini};

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("tlc-utils-{}-{name}.ini", process::id()))
    }

    #[test]
    fn missing_file_yields_empty_document() {
        let path = temp_path("missing");
        let _ = fs_err::remove_file(&path);
        let ini = read_ini_or_default(&path).unwrap();
        assert_eq!(ini.sections().flatten().count(), 0);
    }

    #[test]
    fn values_are_kept_verbatim() {
        let path = temp_path("verbatim");
        fs_err::write(
            &path,
            "[DEFAULT]\nserver = www.traillifeconnect.com\nsheet = \"Roll\"\n\n[tlc.example.org]\npath = C:\\tlc\n",
        )
        .unwrap();
        let ini = read_ini_or_default(&path).unwrap();
        let default = ini.section(Some("DEFAULT")).unwrap();
        assert_eq!(default.get("server"), Some("www.traillifeconnect.com"));
        assert_eq!(default.get("sheet"), Some("\"Roll\""));
        assert_eq!(ini.get_from(Some("tlc.example.org"), "path"), Some(r"C:\tlc"));
        fs_err::remove_file(&path).unwrap();
    }

    #[test]
    fn written_document_reads_back() {
        let path = temp_path("written");
        let mut ini = Ini::new();
        ini.with_section(Some("DEFAULT"))
            .set("server", "www.traillifeconnect.com");
        ini.with_section(Some("www.traillifeconnect.com"))
            .set("email", "me@example.org");
        write_ini(&path, &ini).unwrap();

        let text = fs_err::read_to_string(&path).unwrap();
        assert!(text.contains("[www.traillifeconnect.com]"));
        assert!(text.contains("email = me@example.org"));
        let read = read_ini_or_default(&path).unwrap();
        assert_eq!(
            read.get_from(Some("www.traillifeconnect.com"), "email"),
            Some("me@example.org")
        );
        fs_err::remove_file(&path).unwrap();
    }
}
