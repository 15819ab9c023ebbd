use directories::ProjectDirs;
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "bujo-dev",
            Profile::Prod => "bujo",
        }
    }
}

/// Get the configuration directory path for bujo
/// If profile is Dev, uses "bujo-dev" instead of "bujo"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "bujo", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (log files live here)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "bujo", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<chrono::NaiveDate, chrono::ParseError> {
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Calendar day of a backend date value. The store hands back either a bare
/// "YYYY-MM-DD" or a "YYYY-MM-DD HH:MM:SS.000Z" timestamp, and an empty
/// string when the field is unset.
pub fn day_of(value: &str) -> Option<chrono::NaiveDate> {
    let prefix = value.trim().get(..10)?;
    parse_date(prefix).ok()
}

/// Get the current local date as an ISO 8601 string (YYYY-MM-DD)
pub fn get_current_date_string() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Parsed key binding information
#[derive(Debug, Clone)]
pub struct ParsedKeyBinding {
    pub key_code: crossterm::event::KeyCode,
    pub requires_ctrl: bool,
}

/// Parse a key binding string from config into a ParsedKeyBinding
/// Supports: single keys ("q", "n", "j", "k"), special keys ("Enter", "Left",
/// "Right", "F5", "Space") and the Ctrl modifier ("Ctrl+d")
pub fn parse_key_binding(key_str: &str) -> Result<ParsedKeyBinding, String> {
    let key_str = key_str.trim();

    if let Some(key_part) = key_str.strip_prefix("Ctrl+") {
        let key_code = parse_key_code(key_part)?;
        return Ok(ParsedKeyBinding {
            key_code,
            requires_ctrl: true,
        });
    }

    let key_code = parse_key_code(key_str)?;
    Ok(ParsedKeyBinding {
        key_code,
        requires_ctrl: false,
    })
}

/// Parse a key code from a string (without modifiers)
fn parse_key_code(key_str: &str) -> Result<crossterm::event::KeyCode, String> {
    use crossterm::event::KeyCode;

    match key_str {
        "Enter" => Ok(KeyCode::Enter),
        "Esc" | "Escape" => Ok(KeyCode::Esc),
        "Backspace" => Ok(KeyCode::Backspace),
        "Tab" => Ok(KeyCode::Tab),
        "Space" | " " => Ok(KeyCode::Char(' ')),
        "Left" => Ok(KeyCode::Left),
        "Right" => Ok(KeyCode::Right),
        "Up" => Ok(KeyCode::Up),
        "Down" => Ok(KeyCode::Down),
        "Delete" => Ok(KeyCode::Delete),
        "F1" => Ok(KeyCode::F(1)),
        "F5" => Ok(KeyCode::F(5)),
        _ => {
            if key_str.chars().count() == 1 {
                match key_str.chars().next() {
                    Some(c) => Ok(KeyCode::Char(c)),
                    None => Err("Empty key string".to_string()),
                }
            } else {
                Err(format!("Unknown key binding: {}", key_str))
            }
        }
    }
}
