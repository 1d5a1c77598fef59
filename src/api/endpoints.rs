use crate::model::SessionId;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400x300?text=Image+Error";
pub const PLACEHOLDER_ALT: &str = "Image loading error";

/// Where the portal serves each resource. Paths are joined onto `base_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub emergency_status: String,
    pub emergency_reset: String,
    pub pending_count: String,
    pub pending_logs: String,
    pub image: String,
    pub reviews: String,
    pub detail: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            emergency_status: "/admin/api/status/emergency".to_owned(),
            emergency_reset: "/admin/api/status/emergency/reset".to_owned(),
            pending_count: "/admin/reviews/pending/count".to_owned(),
            pending_logs: "/admin/reviews".to_owned(),
            image: "/admin/image".to_owned(),
            reviews: "/admin/reviews".to_owned(),
            detail: "/reviews".to_owned(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    fn session_url(&self, prefix: &str, session_id: &SessionId) -> Option<String> {
        session_id
            .is_url_safe()
            .then(|| format!("{}/{}", self.url(prefix).trim_end_matches('/'), session_id))
    }

    /// Image for a session card, or the placeholder when the id cannot be
    /// used in a URL.
    pub fn image(&self, session_id: &SessionId) -> ImageSource {
        match self.session_url(&self.image, session_id) {
            Some(url) => ImageSource::Remote {
                url,
                alt: format!("Verification for {session_id}"),
            },
            None => ImageSource::Placeholder,
        }
    }

    pub fn detail_url(&self, session_id: &SessionId) -> Option<String> {
        self.session_url(&self.detail, session_id)
    }

    pub fn review_action_url(&self, session_id: &SessionId, action: &str) -> Option<String> {
        self.session_url(&self.reviews, session_id)
            .map(|url| format!("{url}/{action}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Remote { url: String, alt: String },
    Placeholder,
}

impl ImageSource {
    pub fn src(&self) -> &str {
        match self {
            ImageSource::Remote { url, .. } => url,
            ImageSource::Placeholder => PLACEHOLDER_IMAGE,
        }
    }

    pub fn alt(&self) -> &str {
        match self {
            ImageSource::Remote { alt, .. } => alt,
            ImageSource::Placeholder => PLACEHOLDER_ALT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_base() {
        let endpoints = Endpoints::new("http://portal.local:8080/");
        assert_eq!(
            endpoints.url(&endpoints.emergency_status),
            "http://portal.local:8080/admin/api/status/emergency"
        );
        assert_eq!(endpoints.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn image_falls_back_for_unsafe_ids() {
        let endpoints = Endpoints::new("http://portal");
        let image = endpoints.image(&SessionId::new("abc-1"));
        assert_eq!(image.src(), "http://portal/admin/image/abc-1");
        assert_eq!(image.alt(), "Verification for abc-1");

        assert_eq!(ImageSource::Placeholder.src(), PLACEHOLDER_IMAGE);
        assert_eq!(ImageSource::Placeholder.alt(), PLACEHOLDER_ALT);

        assert_eq!(endpoints.image(&SessionId::new("")), ImageSource::Placeholder);
    }

    #[test]
    fn review_actions() {
        let endpoints = Endpoints::new("http://portal");
        assert_eq!(
            endpoints.review_action_url(&SessionId::new("s1"), "approve").as_deref(),
            Some("http://portal/admin/reviews/s1/approve")
        );
        assert_eq!(
            endpoints.detail_url(&SessionId::new("s1")).as_deref(),
            Some("http://portal/reviews/s1")
        );
        assert_eq!(endpoints.review_action_url(&SessionId::new("a b"), "deny"), None);
    }
}
