//! Rendering collaborator seam

use url::Url;

use crate::security::{CertificateResult, Generation};

/// The rendering engine behind one tab.
///
/// The tab calls into it; the embedder reports what it observes back through
/// [`RendererEvent`]s stamped with the generation passed to [`load`].
///
/// [`load`]: RenderingBackend::load
#[cfg_attr(test, mockall::automock)]
pub trait RenderingBackend: Send {
    /// Start fetching and rendering `url` as load `generation`
    fn load(&mut self, url: &Url, generation: Generation);

    fn go_back(&mut self);

    fn go_forward(&mut self);

    fn reload(&mut self);

    /// Cancel the current load
    fn stop_loading(&mut self);

    fn set_zoom_scale(&mut self, factor: f32);

    /// Install a user script that runs at document start of every page
    fn inject_script(&mut self, source: &str);

    fn can_go_back(&self) -> bool;

    fn can_go_forward(&self) -> bool;
}

/// What the renderer reports while a page loads
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    CertificateValidated {
        generation: Generation,
        result: CertificateResult,
    },
    SubresourceLoaded {
        generation: Generation,
        url: Url,
    },
    ProgressChanged {
        generation: Generation,
        fraction: f32,
    },
    HistoryChanged,
}
