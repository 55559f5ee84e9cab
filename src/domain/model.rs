use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of mod a portal post offers. Decides destination folder and unpack policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Camouflage,
    Mission,
    Sight,
    #[serde(other)]
    Unknown,
}

impl Category {
    /// Recognized categories in modlist block order.
    pub const KNOWN: [Category; 3] = [Category::Camouflage, Category::Mission, Category::Sight];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Camouflage => "camouflage",
            Category::Mission => "mission",
            Category::Sight => "sight",
            Category::Unknown => "unknown",
        }
    }

    /// Block header used by the text modlist and list labels.
    pub fn header(self) -> Option<&'static str> {
        match self {
            Category::Camouflage => Some("[CAMO]"),
            Category::Mission => Some("[MISSION]"),
            Category::Sight => Some("[SIGHT]"),
            Category::Unknown => None,
        }
    }

    pub fn from_header(line: &str) -> Option<Category> {
        Category::KNOWN
            .into_iter()
            .find(|category| category.header() == Some(line))
    }

    pub fn is_known(self) -> bool {
        self != Category::Unknown
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A download link found on the portal, waiting in the mod list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModReference {
    pub url: String,
    pub name: String,
    pub category: Category,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

const LABEL_WIDTH: usize = 35;

impl ModReference {
    /// `ordinal` is the 1-based position used when the url has no path tail.
    pub fn new(url: impl Into<String>, category: Category, ordinal: usize) -> Self {
        let url = url.into();
        let name = url_tail(&url)
            .filter(|tail| !tail.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Mod {}", ordinal));

        Self {
            url,
            name,
            category,
            selected: true,
        }
    }

    /// Short list label, e.g. `[CAMO] skin42.zip`.
    pub fn label(&self) -> String {
        let label = match self.category.header() {
            Some(header) => format!("{} {}", header, self.name),
            None => self.name.clone(),
        };

        if label.chars().count() > LABEL_WIDTH {
            let truncated: String = label.chars().take(LABEL_WIDTH).collect();
            format!("{}...", truncated)
        } else {
            label
        }
    }
}

fn default_selected() -> bool {
    true
}

fn url_tail(url: &str) -> Option<&str> {
    let without_query = url.split(|c| c == '?' || c == '#').next()?;
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    path.rsplit('/').next()
}

/// One unit of work handed to the fetch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub url: String,
    pub destination: PathBuf,
    pub category: Category,
}

/// A successfully installed mod, as recorded in the master list.
///
/// Deserializes from either `{"url": .., "category": ..}` or a bare url string,
/// which older settings files and modlists contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawEntry")]
pub struct MasterEntry {
    pub url: String,
    pub category: Category,
}

impl MasterEntry {
    pub fn new(url: impl Into<String>, category: Category) -> Self {
        Self {
            url: url.into(),
            category,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Bare(String),
    Full {
        url: String,
        #[serde(default)]
        category: Option<Category>,
    },
}

impl From<RawEntry> for MasterEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Bare(url) => MasterEntry::new(url, Category::Unknown),
            RawEntry::Full { url, category } => {
                MasterEntry::new(url, category.unwrap_or(Category::Unknown))
            }
        }
    }
}

/// Result of one attempted download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub url: String,
    pub category: Category,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Running,
    Cancelled,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url_tail() {
        let reference = ModReference::new(
            "https://live.warthunder.com/dl/abc123/skin42.zip?x=1",
            Category::Camouflage,
            1,
        );
        assert_eq!(reference.name, "skin42.zip");
        assert!(reference.selected);
    }

    #[test]
    fn test_name_falls_back_to_ordinal() {
        let reference = ModReference::new("https://example.com/", Category::Sight, 3);
        assert_eq!(reference.name, "Mod 3");
    }

    #[test]
    fn test_label_is_prefixed_and_truncated() {
        let short = ModReference::new("https://example.com/dl/a.zip", Category::Mission, 1);
        assert_eq!(short.label(), "[MISSION] a.zip");

        let long = ModReference::new(
            "https://example.com/dl/a_really_long_camouflage_archive_name.zip",
            Category::Camouflage,
            1,
        );
        assert!(long.label().starts_with("[CAMO] a_really"));
        assert!(long.label().ends_with("..."));
        assert_eq!(long.label().chars().count(), LABEL_WIDTH + 3);
    }

    #[test]
    fn test_category_headers() {
        assert_eq!(Category::from_header("[SIGHT]"), Some(Category::Sight));
        assert_eq!(Category::from_header("[sight]"), None);
        assert_eq!(Category::Unknown.header(), None);
    }

    #[test]
    fn test_master_entry_accepts_legacy_shapes() {
        let entries: Vec<MasterEntry> = serde_json::from_str(
            r#"["https://a/1", {"url": "https://a/2", "category": "sight"},
               {"url": "https://a/3", "category": null},
               {"url": "https://a/4", "category": "vehicle"}]"#,
        )
        .unwrap();

        assert_eq!(
            entries,
            vec![
                MasterEntry::new("https://a/1", Category::Unknown),
                MasterEntry::new("https://a/2", Category::Sight),
                MasterEntry::new("https://a/3", Category::Unknown),
                MasterEntry::new("https://a/4", Category::Unknown),
            ]
        );
    }
}
