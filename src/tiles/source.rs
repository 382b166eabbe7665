use crate::core::geo::TileKey;
use crate::{LabelError, Result};

/// Trait representing anything that can produce tile URLs for a given key.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `key`.
    fn url(&self, key: TileKey) -> String;
}

/// URL template with `{z}`, `{x}`, `{y}` placeholders and an optional `{s}`
/// subdomain placeholder rotated per tile.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplate {
    template: String,
    subdomains: Vec<String>,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(LabelError::InvalidConfig(format!(
                    "url template {:?} is missing {}",
                    template, placeholder
                )));
            }
        }
        Ok(Self {
            template,
            subdomains: Vec::new(),
        })
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl TileSource for UrlTemplate {
    fn url(&self, key: TileKey) -> String {
        let mut url = self
            .template
            .replace("{z}", &key.z.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string());

        if url.contains("{s}") {
            // Guard against empty subdomain list
            let sub = if self.subdomains.is_empty() {
                ""
            } else {
                let idx = ((key.x + key.y) % self.subdomains.len() as u32) as usize;
                self.subdomains[idx].as_str()
            };
            url = url.replace("{s}", sub);
        }
        url
    }
}
