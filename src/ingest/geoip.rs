use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Country code reported when a lookup cannot resolve an address.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Resolves client IPs to ISO country codes using a MaxMind GeoLite2
/// Country or City database. Without a database every lookup is "Unknown".
pub struct GeoResolver {
    reader: Option<Arc<maxminddb::Reader<Vec<u8>>>>,
}

impl GeoResolver {
    /// Open a MaxMind .mmdb database file.
    ///
    /// Degrades gracefully: a `None` path, a missing file or a file that
    /// fails to open all produce a resolver that answers "Unknown".
    pub fn open(path: Option<&Path>) -> Self {
        let reader = path.and_then(|p| {
            if !p.exists() {
                tracing::warn!(path = %p.display(), "GeoIP database not found, country lookup disabled");
                return None;
            }
            match maxminddb::Reader::open_readfile(p) {
                Ok(r) => {
                    tracing::info!(path = %p.display(), "GeoIP database loaded");
                    Some(Arc::new(r))
                }
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "Failed to open GeoIP database, country lookup disabled");
                    None
                }
            }
        });
        Self { reader }
    }

    pub const fn is_loaded(&self) -> bool {
        self.reader.is_some()
    }

    /// ISO 3166-1 alpha-2 code for `ip`, or "Unknown".
    ///
    /// The address is used only for the lookup and is never stored or logged.
    pub fn resolve_country(&self, ip: &str) -> String {
        self.lookup_iso_code(ip)
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string())
    }

    fn lookup_iso_code(&self, ip: &str) -> Option<String> {
        let reader = self.reader.as_ref()?;
        let addr = ip.parse::<IpAddr>().ok()?;
        let lookup_result = reader.lookup(addr).ok()?;
        // City records are a superset of Country records, so this decodes
        // either database flavour.
        let city = lookup_result
            .decode::<maxminddb::geoip2::City>()
            .ok()
            .flatten()?;
        city.country.iso_code.map(String::from)
    }
}
