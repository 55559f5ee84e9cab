use std::path::PathBuf;

use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::application::download_coordinator::{CancelHandle, DownloadCoordinator, DownloadEvent};
use crate::application::extractor::{self, ExtractError};
use crate::domain::modlist::{self, ModlistFormat};
use crate::domain::{
    AppError, Category, DownloadPhase, FolderSet, MasterEntry, ModReference, PendingDownload,
};
use crate::settings::Settings;

/// Where imported modlist entries go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    /// Queue entries in the mod list for download.
    ModList,
    /// Replace the master list with the file's contents.
    MasterList,
}

/// Session state: folders, the mod list being assembled and the master list.
pub struct ModOrganizer {
    api_client: ApiClient,
    folders: Option<FolderSet>,
    mod_list: Vec<ModReference>,
    master_list: Vec<MasterEntry>,
    phase: DownloadPhase,
    has_sight_mods: bool,
    cancel: Option<CancelHandle>,
}

impl ModOrganizer {
    pub fn new(api_client: ApiClient, settings: Settings) -> Self {
        let folders = settings.folders();
        let mod_list = settings
            .mod_list
            .into_iter()
            .filter(|reference| reference.category.is_known())
            .collect();

        Self {
            api_client,
            folders,
            mod_list,
            master_list: settings.master_list,
            phase: DownloadPhase::Idle,
            has_sight_mods: false,
            cancel: None,
        }
    }

    pub fn to_settings(&self) -> Settings {
        Settings {
            root_folder: self.folders.as_ref().map(|f| f.root.clone()),
            production_folder: self.folders.as_ref().and_then(|f| f.production.clone()),
            master_list: self.master_list.clone(),
            mod_list: self.mod_list.clone(),
        }
    }

    pub fn api_client(&self) -> &ApiClient {
        &self.api_client
    }

    pub fn folders(&self) -> Option<&FolderSet> {
        self.folders.as_ref()
    }

    pub fn mod_list(&self) -> &[ModReference] {
        &self.mod_list
    }

    pub fn master_list(&self) -> &[MasterEntry] {
        &self.master_list
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    /// True when the last dispatched sequence contained sight mods.
    pub fn has_sight_mods(&self) -> bool {
        self.has_sight_mods
    }

    /// Select the game root (and optionally the production folder) and create
    /// every install folder beneath them.
    pub fn set_folders(
        &mut self,
        root: PathBuf,
        production: Option<PathBuf>,
    ) -> Result<&FolderSet, AppError> {
        let production = production.or_else(|| {
            self.folders
                .as_ref()
                .and_then(|current| current.production.clone())
        });
        let folders = FolderSet::derive(root, production);
        folders.ensure()?;
        info!(root = %folders.root.display(), production = ?folders.production, "folders selected");
        Ok(self.folders.insert(folders))
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.mod_list.iter().any(|reference| reference.url == url)
    }

    /// Queue a link. Returns `false` when the url is already queued.
    pub fn add_mod(&mut self, url: &str, category: Category) -> Result<bool, AppError> {
        if !category.is_known() {
            return Err(ExtractError::UnsupportedCategory.into());
        }
        if self.is_queued(url) {
            debug!(url, "already queued");
            return Ok(false);
        }

        let reference = ModReference::new(url, category, self.mod_list.len() + 1);
        info!(url, %category, name = %reference.name, "mod queued");
        self.mod_list.push(reference);
        Ok(true)
    }

    /// Queue the download link of the post shown in `html`.
    pub fn add_from_page(&mut self, html: &str, page_url: &str) -> Result<&ModReference, AppError> {
        let link = extractor::extract(html, page_url, |url| self.is_queued(url))?;
        self.add_mod(&link.url, link.category)?;
        self.mod_list
            .last()
            .ok_or(AppError::NoSuchItem(self.mod_list.len()))
    }

    /// Flip selection of the item at `index`; returns the new state.
    pub fn toggle(&mut self, index: usize) -> Result<bool, AppError> {
        let reference = self
            .mod_list
            .get_mut(index)
            .ok_or(AppError::NoSuchItem(index))?;
        reference.selected = !reference.selected;
        Ok(reference.selected)
    }

    pub fn remove(&mut self, index: usize) -> Result<ModReference, AppError> {
        if index >= self.mod_list.len() {
            return Err(AppError::NoSuchItem(index));
        }
        Ok(self.mod_list.remove(index))
    }

    /// Stop any running sequence and empty the mod list.
    pub fn clear(&mut self) {
        self.cancel();
        self.mod_list.clear();
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.cancel {
            info!("cancellation requested");
            handle.cancel();
        }
    }

    /// Selected items with their install folder.
    pub fn pending_downloads(&self) -> Result<Vec<PendingDownload>, AppError> {
        let folders = self
            .folders
            .as_ref()
            .ok_or(AppError::FolderNotConfigured("root"))?;

        self.mod_list
            .iter()
            .filter(|reference| reference.selected && reference.category.is_known())
            .map(|reference| {
                let destination = folders
                    .destination_for(reference.category)
                    .ok_or(AppError::FolderNotConfigured("production"))?;
                Ok(PendingDownload {
                    url: reference.url.clone(),
                    destination: destination.to_path_buf(),
                    category: reference.category,
                })
            })
            .collect()
    }

    /// Dispatch the selected items. The returned stream must be driven to
    /// completion, feeding every event back through [`ModOrganizer::update`].
    pub fn start_download(
        &mut self,
    ) -> Result<(BoxStream<'static, DownloadEvent>, CancelHandle), AppError> {
        if self.phase == DownloadPhase::Running {
            return Err(AppError::Busy);
        }

        let items = self.pending_downloads()?;
        if items.is_empty() {
            return Err(AppError::NothingSelected);
        }

        let folders = self
            .folders
            .as_ref()
            .ok_or(AppError::FolderNotConfigured("root"))?;
        folders.ensure()?;

        let coordinator = DownloadCoordinator::new(self.api_client.clone(), folders.user_missions.clone());
        let handle = coordinator.cancel_handle();

        self.has_sight_mods = items.iter().any(|item| item.category == Category::Sight);
        self.phase = DownloadPhase::Running;
        self.cancel = Some(handle.clone());
        info!(count = items.len(), "download sequence started");

        Ok((coordinator.download_stream(items), handle))
    }

    pub fn update(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Progress { label, .. } => debug!(%label, "progress"),
            DownloadEvent::Finished(outcome) if outcome.success => {
                if !self.master_list.iter().any(|entry| entry.url == outcome.url) {
                    self.master_list
                        .push(MasterEntry::new(outcome.url.clone(), outcome.category));
                }

                match self
                    .mod_list
                    .iter_mut()
                    .find(|reference| reference.url == outcome.url)
                {
                    Some(reference) => reference.selected = false,
                    None => debug!(url = %outcome.url, "installed mod is no longer in the mod list"),
                }
            }
            DownloadEvent::Finished(_) => {}
            DownloadEvent::AllDone { cancelled } => {
                self.phase = if *cancelled {
                    DownloadPhase::Cancelled
                } else {
                    DownloadPhase::Completed
                };
                self.cancel = None;
            }
        }
    }

    /// Master list as a shareable text modlist.
    pub fn export_modlist(&self) -> String {
        modlist::encode(&self.master_list)
    }

    /// Import a modlist. Returns how many entries were taken.
    ///
    /// On malformed input, entries before the bad one are kept and the error
    /// is returned.
    pub fn import_modlist(
        &mut self,
        input: &str,
        format: ModlistFormat,
        target: ImportTarget,
    ) -> Result<usize, AppError> {
        let decoded = modlist::decode(input, format);

        let imported = match target {
            ImportTarget::ModList => {
                let mut imported = 0;
                for entry in &decoded.entries {
                    if !entry.category.is_known() {
                        warn!(url = %entry.url, "skipping modlist entry without a category");
                        continue;
                    }
                    if self.add_mod(&entry.url, entry.category)? {
                        imported += 1;
                    }
                }
                imported
            }
            ImportTarget::MasterList => {
                let mut replacement: Vec<MasterEntry> = Vec::with_capacity(decoded.entries.len());
                for entry in decoded.entries {
                    if !replacement.iter().any(|existing| existing.url == entry.url) {
                        replacement.push(entry);
                    }
                }
                let imported = replacement.len();
                self.master_list = replacement;
                imported
            }
        };

        info!(imported, ?target, "modlist imported");
        match decoded.error {
            Some(e) => Err(AppError::Import(format!(
                "{} ({} entries imported before the error)",
                e, imported
            ))),
            None => Ok(imported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use crate::application::test_helpers::zip_bytes;
    use crate::domain::DownloadOutcome;
    use futures::StreamExt;

    fn organizer() -> ModOrganizer {
        let client = ApiClient::new(ClientConfig::default()).unwrap();
        ModOrganizer::new(client, Settings::default())
    }

    fn post(category_feed: &str, link: &str) -> String {
        format!(
            r#"<div id="clb" style="display: block;"><div><a href="/feed/{}/">x</a></div></div>
               <a href="{}">download</a>"#,
            category_feed, link
        )
    }

    #[test]
    fn test_duplicate_url_added_once() {
        let mut app = organizer();
        assert!(app.add_mod("https://a/dl/1", Category::Sight).unwrap());
        assert!(!app.add_mod("https://a/dl/1", Category::Sight).unwrap());
        assert_eq!(app.mod_list().len(), 1);
    }

    #[test]
    fn test_unknown_category_never_queued() {
        let mut app = organizer();
        assert!(app.add_mod("https://a/dl/1", Category::Unknown).is_err());

        let html = r#"<a href="/feed/vehicles/">v</a><a href="/downloads/start/1">d</a>"#;
        let err = app
            .add_from_page(html, "https://live.warthunder.com/feed/all/")
            .unwrap_err();

        assert!(matches!(err, AppError::Extract(ExtractError::UnsupportedCategory)));
        assert!(app.mod_list().is_empty());
    }

    #[test]
    fn test_add_from_page_twice_is_deduplicated() {
        let mut app = organizer();
        let html = post("camouflages", "/downloads/start/77");
        let page = "https://live.warthunder.com/post/1/";

        let added = app.add_from_page(&html, page).unwrap();
        assert_eq!(added.url, "https://live.warthunder.com/downloads/start/77");
        assert_eq!(added.category, Category::Camouflage);
        assert_eq!(added.name, "77");

        let err = app.add_from_page(&html, page).unwrap_err();
        assert!(matches!(err, AppError::Extract(ExtractError::NoDownloadLinks)));
        assert_eq!(app.mod_list().len(), 1);
    }

    #[test]
    fn test_toggle_and_remove() {
        let mut app = organizer();
        app.add_mod("https://a/dl/1", Category::Mission).unwrap();
        app.add_mod("https://a/dl/2", Category::Mission).unwrap();

        assert!(!app.toggle(0).unwrap());
        assert!(matches!(app.toggle(5), Err(AppError::NoSuchItem(5))));
        assert_eq!(app.remove(1).unwrap().url, "https://a/dl/2");
        assert_eq!(app.mod_list().len(), 1);
    }

    #[test]
    fn test_pending_requires_folders() {
        let mut app = organizer();
        app.add_mod("https://a/dl/1", Category::Sight).unwrap();
        assert!(matches!(
            app.pending_downloads(),
            Err(AppError::FolderNotConfigured("root"))
        ));

        let root = tempfile::tempdir().unwrap();
        app.set_folders(root.path().to_path_buf(), None).unwrap();
        assert!(matches!(
            app.pending_downloads(),
            Err(AppError::FolderNotConfigured("production"))
        ));
    }

    #[test]
    fn test_pending_maps_categories_and_skips_unselected() {
        let root = tempfile::tempdir().unwrap();
        let prod = tempfile::tempdir().unwrap();
        let mut app = organizer();
        app.set_folders(root.path().to_path_buf(), Some(prod.path().to_path_buf()))
            .unwrap();
        app.add_mod("https://a/dl/c", Category::Camouflage).unwrap();
        app.add_mod("https://a/dl/m", Category::Mission).unwrap();
        app.add_mod("https://a/dl/s", Category::Sight).unwrap();
        app.toggle(1).unwrap();

        let pending = app.pending_downloads().unwrap();

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].destination, root.path().join("UserSkins"));
        assert_eq!(
            pending[1].destination,
            prod.path().join("UserSights").join("all_tanks")
        );
        assert!(prod.path().join("UserSights/all_tanks").is_dir());
    }

    #[tokio::test]
    async fn test_second_start_while_running_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut app = organizer();
        app.set_folders(root.path().to_path_buf(), None).unwrap();
        app.add_mod("http://127.0.0.1:9/dl/1.zip", Category::Camouflage)
            .unwrap();

        let (_stream, _cancel) = app.start_download().unwrap();

        assert_eq!(app.phase(), DownloadPhase::Running);
        assert!(matches!(app.start_download(), Err(AppError::Busy)));
    }

    #[test]
    fn test_nothing_selected() {
        let root = tempfile::tempdir().unwrap();
        let mut app = organizer();
        app.set_folders(root.path().to_path_buf(), None).unwrap();
        assert!(matches!(app.start_download(), Err(AppError::NothingSelected)));
    }

    #[test]
    fn test_update_records_successes_only() {
        let mut app = organizer();
        app.add_mod("https://a/dl/ok", Category::Sight).unwrap();
        app.add_mod("https://a/dl/bad", Category::Mission).unwrap();

        app.update(&DownloadEvent::Finished(DownloadOutcome {
            url: "https://a/dl/ok".to_string(),
            category: Category::Sight,
            success: true,
            message: "Downloaded: ok".to_string(),
        }));
        app.update(&DownloadEvent::Finished(DownloadOutcome {
            url: "https://a/dl/bad".to_string(),
            category: Category::Mission,
            success: false,
            message: "HTTP 500".to_string(),
        }));
        app.update(&DownloadEvent::AllDone { cancelled: false });

        assert_eq!(
            app.master_list(),
            &[MasterEntry::new("https://a/dl/ok", Category::Sight)]
        );
        assert!(!app.mod_list()[0].selected);
        assert!(app.mod_list()[1].selected);
        assert_eq!(app.phase(), DownloadPhase::Completed);
    }

    #[test]
    fn test_success_after_clear_is_still_recorded() {
        let mut app = organizer();
        app.add_mod("https://a/dl/camo.zip", Category::Camouflage)
            .unwrap();
        app.clear();

        app.update(&DownloadEvent::Finished(DownloadOutcome {
            url: "https://a/dl/camo.zip".to_string(),
            category: Category::Camouflage,
            success: true,
            message: "Installed camo.zip".to_string(),
        }));

        assert!(app.mod_list().is_empty());
        assert_eq!(
            app.master_list(),
            &[MasterEntry::new("https://a/dl/camo.zip", Category::Camouflage)]
        );
    }

    #[test]
    fn test_import_queues_known_entries_once() {
        let mut app = organizer();
        app.add_mod("https://a/dl/1", Category::Camouflage).unwrap();

        let text = "[CAMO]\nhttps://a/dl/1\nhttps://a/dl/2\n[SIGHT]\nhttps://a/dl/3\n";
        let imported = app
            .import_modlist(text, ModlistFormat::Text, ImportTarget::ModList)
            .unwrap();

        assert_eq!(imported, 2);
        assert_eq!(app.mod_list().len(), 3);
        assert_eq!(app.mod_list()[2].category, Category::Sight);
    }

    #[test]
    fn test_import_keeps_entries_before_error() {
        let mut app = organizer();
        let json = r#"{"mods": [{"url": "https://a/dl/1", "category": "mission"}, "https://a/dl/2", false]}"#;

        let err = app
            .import_modlist(json, ModlistFormat::LegacyJson, ImportTarget::ModList)
            .unwrap_err();

        assert!(matches!(err, AppError::Import(_)));
        assert_eq!(app.mod_list().len(), 1);
        assert_eq!(app.mod_list()[0].url, "https://a/dl/1");
    }

    #[test]
    fn test_import_replaces_master_list() {
        let mut app = organizer();
        app.import_modlist(
            "[MISSION]\nhttps://a/m\n",
            ModlistFormat::Text,
            ImportTarget::MasterList,
        )
        .unwrap();
        app.import_modlist(
            "[SIGHT]\nhttps://a/s\nhttps://a/s\n",
            ModlistFormat::Text,
            ImportTarget::MasterList,
        )
        .unwrap();

        assert_eq!(app.master_list(), &[MasterEntry::new("https://a/s", Category::Sight)]);
        assert_eq!(app.export_modlist(), "[SIGHT]\nhttps://a/s\n");
    }

    #[test]
    fn test_settings_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let mut app = organizer();
        app.set_folders(root.path().to_path_buf(), None).unwrap();
        app.add_mod("https://a/dl/1", Category::Mission).unwrap();

        let settings = app.to_settings();
        let restored = ModOrganizer::new(app.api_client().clone(), settings.clone());

        assert_eq!(restored.to_settings(), settings);
        assert_eq!(restored.folders(), app.folders());
    }

    #[tokio::test]
    async fn test_page_to_master_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/downloads/start/42")
            .with_status(200)
            .with_header("content-disposition", "attachment; filename=\"skin42.zip\"")
            .with_body(zip_bytes(&[("a.dds", "a"), ("b.dds", "b")]))
            .create_async()
            .await;

        let root = tempfile::tempdir().unwrap();
        let mut app = organizer();
        app.set_folders(root.path().to_path_buf(), None).unwrap();

        let page = format!("{}/feed/all/", server.url());
        app.add_from_page(&post("camouflages", "/downloads/start/42"), &page)
            .unwrap();

        let (mut stream, _cancel) = app.start_download().unwrap();
        while let Some(event) = stream.next().await {
            app.update(&event);
        }

        assert_eq!(app.phase(), DownloadPhase::Completed);
        assert_eq!(
            app.master_list(),
            &[MasterEntry::new(
                format!("{}/downloads/start/42", server.url()),
                Category::Camouflage
            )]
        );
        assert!(root.path().join("UserSkins/skin42/a.dds").is_file());
    }
}
