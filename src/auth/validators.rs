use lazy_static::lazy_static;
use regex::Regex;

/// Which email domains may register or log in. An empty allow-list accepts
/// any syntactically valid domain.
#[derive(Debug, Clone, Default)]
pub struct EmailPolicy {
    allowed_domains: Vec<String>,
}

impl EmailPolicy {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn any_domain() -> Self {
        Self::default()
    }

    /// A bare label such as `gmail` matches the first label of the domain
    /// (`gmail.com`, `gmail.co.id`); a dotted entry must match the whole domain.
    fn allows(&self, domain: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let domain = domain.to_lowercase();
        let first_label = domain.split('.').next().unwrap_or_default();
        self.allowed_domains.iter().any(|entry| {
            if entry.contains('.') {
                domain == *entry
            } else {
                first_label == entry
            }
        })
    }
}

pub fn validate_email(email: &str, policy: &EmailPolicy) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    }
    if !EMAIL_RE.is_match(email) {
        return false;
    }
    match email.rsplit_once('@') {
        Some((_, domain)) => policy.allows(domain),
        None => false,
    }
}

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= 8
}
