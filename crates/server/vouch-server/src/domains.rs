//! Managed-domain matching.

/// The domains this deployment manages, longest first so the most specific
/// entry wins.
#[derive(Debug, Clone, Default)]
pub struct Domains {
    domains: Vec<String>,
}

impl Domains {
    pub fn new(domains: &[String]) -> Self {
        let mut domains: Vec<String> = domains
            .iter()
            .map(|d| d.trim_start_matches('.').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        domains.dedup();
        Self { domains }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// The managed domain `host` belongs to, if any. A `:port` suffix is ignored.
    pub fn matches(&self, host: &str) -> Option<&str> {
        let host = host.split(':').next().unwrap_or_default();
        self.domains
            .iter()
            .find(|domain| is_same_or_subdomain(host, domain))
            .map(String::as_str)
    }

    /// Whether an email address belongs to a managed domain.
    pub fn is_under_management(&self, email: &str) -> bool {
        match email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() => self.matches(domain).is_some(),
            _ => false,
        }
    }
}

fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
