//! Server side of an export: checks who is asking, resolves the content the
//! poster belongs to, renders and stores the document.

use std::path::PathBuf;

use crate::config::StudioConfig;
use crate::error::Error;
use crate::model::{ExportRequest, GeneratedDocument, PostStatus, PosterParameters, SourceContent};
use crate::pdf::{DocumentMeta, PosterAssets, decode_image, load_image_file, render_poster};
use crate::storage::DocumentStore;
use crate::wire::{ExportResponse, ExportSubmission, decode_data_uri, parse_post_id};

const MSG_SECURITY: &str = "Security check failed.";
const MSG_NOT_AVAILABLE: &str = "This post is not available for PDF generation.";
const MSG_NOT_FOUND: &str = "Post not found.";
const MSG_GENERATED: &str = "PDF generated successfully.";
const MSG_FAILED: &str = "Failed to generate the PDF file.";

pub trait Authorizer: Send + Sync {
    /// Request token check (anti-forgery).
    fn verify_token(&self, token: &str) -> bool;
    fn can_edit(&self, token: &str, post_id: u64) -> bool;
    fn is_publicly_viewable(&self, content: &SourceContent) -> bool;
}

pub trait ContentSource: Send + Sync {
    fn fetch(&self, id: u64) -> Result<Option<SourceContent>, Error>;
}

/// One shared token; holders are editors or plain viewers.
pub struct StaticTokenAuthorizer {
    token: String,
    editor: bool,
}

impl StaticTokenAuthorizer {
    pub fn editor(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            editor: true,
        }
    }

    pub fn viewer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            editor: false,
        }
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn verify_token(&self, token: &str) -> bool {
        !self.token.is_empty() && token == self.token
    }

    fn can_edit(&self, token: &str, _post_id: u64) -> bool {
        self.editor && self.verify_token(token)
    }

    fn is_publicly_viewable(&self, content: &SourceContent) -> bool {
        content.status == PostStatus::Publish
    }
}

/// Content records stored as `{id}.json` in one directory.
pub struct JsonContentSource {
    dir: PathBuf,
}

impl JsonContentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ContentSource for JsonContentSource {
    fn fetch(&self, id: u64) -> Result<Option<SourceContent>, Error> {
        let path = self.dir.join(format!("{id}.json"));
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut content: SourceContent = serde_json::from_slice(&data)?;
        // Relative image paths are relative to the record.
        if let Some(img) = content.featured_image.as_mut() {
            if img.path.is_relative() {
                img.path = self.dir.join(&img.path);
            }
        }
        Ok(Some(content))
    }
}

pub struct ExportService {
    config: StudioConfig,
    store: DocumentStore,
    authorizer: Box<dyn Authorizer>,
    content: Box<dyn ContentSource>,
}

impl ExportService {
    pub fn new(
        config: StudioConfig,
        authorizer: impl Authorizer + 'static,
        content: impl ContentSource + 'static,
    ) -> Self {
        let store = DocumentStore::new(&config.upload_dir, config.upload_url.clone());
        Self {
            config,
            store,
            authorizer: Box::new(authorizer),
            content: Box::new(content),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Every outcome, good or bad, becomes a response the client can show.
    pub fn handle(&self, submission: &ExportSubmission) -> ExportResponse {
        match self.generate(submission) {
            Ok(doc) => ExportResponse::ok(doc.url, MSG_GENERATED),
            Err(e @ (Error::Unauthorized(_) | Error::InvalidInput(_) | Error::NotFound(_))) => {
                log::warn!("Export refused: {e}");
                ExportResponse::failure(e.to_string())
            }
            Err(e) => {
                log::error!("Export failed: {e}");
                ExportResponse::failure(MSG_FAILED)
            }
        }
    }

    pub fn generate(&self, submission: &ExportSubmission) -> Result<GeneratedDocument, Error> {
        if !self.authorizer.verify_token(&submission.auth_token) {
            return Err(Error::Unauthorized(MSG_SECURITY.into()));
        }
        let post_id = parse_post_id(&submission.post_id)?;
        let content = self
            .content
            .fetch(post_id)?
            .ok_or_else(|| Error::NotFound(MSG_NOT_FOUND.into()))?;

        let public = content.status == PostStatus::Publish
            && self.authorizer.is_publicly_viewable(&content);
        if !public && !self.authorizer.can_edit(&submission.auth_token, post_id) {
            return Err(Error::Unauthorized(MSG_NOT_AVAILABLE.into()));
        }

        let parameters = complete_parameters(submission.parameters.clone(), &content).normalized();
        let captured_image = match submission.image_data.as_deref() {
            Some(uri) if !uri.trim().is_empty() => Some(decode_image(decode_data_uri(uri)?)?),
            _ => None,
        };

        let assets = if captured_image.is_some() {
            PosterAssets::default()
        } else {
            self.load_assets(&content)
        };
        let meta = DocumentMeta {
            title: parameters.display_title(),
            author: self.config.author.clone(),
            creator: self.config.creator.clone(),
        };
        let title = parameters.title.clone();
        let page_size = parameters.page_size;

        let rendered = render_poster(
            ExportRequest {
                parameters,
                captured_image,
            },
            &assets,
            &self.config.template,
            meta,
        )?;
        self.store.store(&title, page_size, &rendered.bytes)
    }

    /// Featured image, logo and QR link for a parametric render. Missing
    /// images are skipped, not fatal.
    pub fn load_assets(&self, content: &SourceContent) -> PosterAssets {
        let featured_image = content
            .featured_image
            .as_ref()
            .and_then(|img| match load_image_file(&img.path) {
                Ok(loaded) => Some(loaded),
                Err(e) => {
                    log::warn!("Featured image unavailable: {e}");
                    None
                }
            });
        let logo = self
            .config
            .logo_path
            .as_ref()
            .and_then(|path| match load_image_file(path) {
                Ok(loaded) => Some(loaded),
                Err(e) => {
                    log::warn!("Logo unavailable: {e}");
                    None
                }
            });
        let qr_target = content
            .status
            .shows_qr()
            .then(|| content.permalink.clone())
            .filter(|link| !link.is_empty());

        PosterAssets {
            featured_image,
            logo,
            qr_target,
        }
    }
}

/// Empty title or date fall back to what the content itself says.
fn complete_parameters(mut params: PosterParameters, content: &SourceContent) -> PosterParameters {
    if params.title.trim().is_empty() || params.date_text.trim().is_empty() {
        let prefilled = PosterParameters::prefill(content);
        if params.title.trim().is_empty() {
            params.title = prefilled.title;
        }
        if params.date_text.trim().is_empty() {
            params.date_text = prefilled.date_text;
        }
    }
    params
}
