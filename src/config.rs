use once_cell::sync::Lazy;
use std::{env, str::FromStr, time::Duration};

pub static SETTINGS: Lazy<ExportConfig> = Lazy::new(ExportConfig::from_env);

const DEFAULT_LOGO_URL: &str = "https://konig-kids.com/wp-content/uploads/2023/05/konigkids-logo.png";

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub fetch_concurrency: usize,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_image_bytes: usize,
    pub logo_url: Option<String>,
    pub branding: Branding,
}

/// Header texts written above the item table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub company_name: String,
    pub address: String,
    pub contact: String,
    pub title: String,
    pub seller: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 5,
            fetch_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            max_image_bytes: 10 * 1024 * 1024,
            logo_url: Some(DEFAULT_LOGO_URL.to_string()),
            branding: Branding::default(),
        }
    }
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: "KONIG KIDS LIMITED".into(),
            address: "Add: NO.12 Southern Dengfeng Road, Chenghai District.".into(),
            contact: "Tel: 0754-89861629 Email: sales@konig-kids.com".into(),
            title: "Quotation List".into(),
            seller: "Seller: Agent AI".into(),
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        // An explicitly empty LOGO_URL disables the logo.
        let logo_url = match env::var("LOGO_URL") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => defaults.logo_url,
        };
        Self {
            fetch_concurrency: parse_env("IMAGE_FETCH_CONCURRENCY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.fetch_concurrency),
            fetch_timeout: parse_env("IMAGE_FETCH_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            connect_timeout: parse_env("HTTP_CONNECT_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            max_image_bytes: parse_env("IMAGE_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_image_bytes),
            logo_url,
            branding: Branding::from_env(),
        }
    }
}

impl Branding {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            company_name: text_env("COMPANY_NAME", defaults.company_name),
            address: text_env("COMPANY_ADDRESS", defaults.address),
            contact: text_env("COMPANY_CONTACT", defaults.contact),
            title: text_env("DOCUMENT_TITLE", defaults.title),
            seller: text_env("SELLER_LABEL", defaults.seller),
        }
    }
}

pub fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn text_env(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
