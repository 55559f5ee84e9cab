use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::model::Category;

pub const USER_SKINS_DIR: &str = "UserSkins";
pub const USER_MISSIONS_DIR: &str = "UserMissions";
pub const USER_SIGHTS_DIR: &str = "UserSights";
pub const SIGHTS_TARGET_DIR: &str = "all_tanks";

/// Config file extension used by missions and sights.
pub const CONFIG_EXTENSION: &str = "blk";

/// Which folder of a [`FolderSet`] a category installs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderRole {
    Root,
    UserSkins,
    UserMissions,
    SightsTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStrategy {
    /// Extract into the destination as-is.
    Direct,
    /// Archives holding only root-level files get a folder named after the archive.
    SubfolderWhenFlat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFilter {
    All,
    Extension(&'static str),
}

impl ExtractionFilter {
    pub fn accepts(self, member: &str) -> bool {
        match self {
            ExtractionFilter::All => true,
            ExtractionFilter::Extension(ext) => {
                let name = member.to_ascii_lowercase();
                name.strip_suffix(&ext.to_ascii_lowercase())
                    .is_some_and(|stem| stem.ends_with('.'))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub folder: FolderRole,
    pub destination: DestinationStrategy,
    pub filter: ExtractionFilter,
}

const POLICIES: [(Category, CategoryPolicy); 4] = [
    (
        Category::Camouflage,
        CategoryPolicy {
            folder: FolderRole::UserSkins,
            destination: DestinationStrategy::SubfolderWhenFlat,
            filter: ExtractionFilter::All,
        },
    ),
    (
        Category::Mission,
        CategoryPolicy {
            folder: FolderRole::UserMissions,
            destination: DestinationStrategy::Direct,
            filter: ExtractionFilter::All,
        },
    ),
    (
        Category::Sight,
        CategoryPolicy {
            folder: FolderRole::SightsTarget,
            destination: DestinationStrategy::Direct,
            filter: ExtractionFilter::Extension(CONFIG_EXTENSION),
        },
    ),
    (
        Category::Unknown,
        CategoryPolicy {
            folder: FolderRole::Root,
            destination: DestinationStrategy::Direct,
            filter: ExtractionFilter::All,
        },
    ),
];

impl Category {
    pub fn policy(self) -> CategoryPolicy {
        POLICIES
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(POLICIES[POLICIES.len() - 1].1)
    }
}

/// Install folders inside the game's user-data tree.
///
/// Everything is derived from the game root and the (optional) production
/// folder, so only those two are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSet {
    pub root: PathBuf,
    pub production: Option<PathBuf>,
    pub user_skins: PathBuf,
    pub user_missions: PathBuf,
    pub user_sights: Option<PathBuf>,
    pub sights_target: Option<PathBuf>,
}

impl FolderSet {
    pub fn derive(root: impl Into<PathBuf>, production: Option<PathBuf>) -> Self {
        let root = root.into();
        let user_sights = production.as_ref().map(|p| p.join(USER_SIGHTS_DIR));
        let sights_target = user_sights.as_ref().map(|p| p.join(SIGHTS_TARGET_DIR));

        Self {
            user_skins: root.join(USER_SKINS_DIR),
            user_missions: root.join(USER_MISSIONS_DIR),
            root,
            production,
            user_sights,
            sights_target,
        }
    }

    /// Creates every folder of the set. Safe to call repeatedly.
    pub fn ensure(&self) -> io::Result<()> {
        let folders = [
            Some(&self.user_skins),
            Some(&self.user_missions),
            self.user_sights.as_ref(),
            self.sights_target.as_ref(),
        ];

        for folder in folders.into_iter().flatten() {
            std::fs::create_dir_all(folder)?;
            debug!(folder = %folder.display(), "ensured install folder");
        }
        Ok(())
    }

    pub fn folder(&self, role: FolderRole) -> Option<&Path> {
        match role {
            FolderRole::Root => Some(&self.root),
            FolderRole::UserSkins => Some(&self.user_skins),
            FolderRole::UserMissions => Some(&self.user_missions),
            FolderRole::SightsTarget => self.sights_target.as_deref(),
        }
    }

    pub fn destination_for(&self, category: Category) -> Option<&Path> {
        self.folder(category.policy().folder)
    }
}
