use crate::certificates::issuance::{IssueSettings, Issuer};
use crate::certificates::notify::LogNotifier;
use crate::config::Config;
use crate::db::PgStore;
use crate::pdf::PdfRenderer;
use crate::storage::AssetLoader;
use std::sync::Arc;

pub struct AppState {
    pub store: PgStore,
    pub renderer: PdfRenderer,
    pub assets: AssetLoader,
    pub notifier: LogNotifier,
    pub settings: IssueSettings,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: PgStore, config: Arc<Config>) -> Self {
        Self {
            store,
            renderer: PdfRenderer::new(
                config.certificates_folder.clone(),
                config.fonts_dir.clone(),
                config.honor_template_layout,
            ),
            assets: AssetLoader::new(config.upload_folder.clone()),
            notifier: LogNotifier::new(config.public_base_url.clone()),
            settings: IssueSettings {
                base_url: config.public_base_url.clone(),
                code_prefix: config.code_prefix.clone(),
            },
            config,
        }
    }

    pub fn issuer(&self) -> Issuer<'_, PgStore, PdfRenderer> {
        Issuer {
            store: &self.store,
            renderer: &self.renderer,
            assets: &self.assets,
            settings: &self.settings,
        }
    }
}
