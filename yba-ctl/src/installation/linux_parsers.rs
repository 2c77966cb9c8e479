// Host probe parsers
//
// Pure functions over the text of /etc/os-release, /proc/meminfo and `df -Pk` so the
// preflight probes can be tested on any machine.

/// Distribution families the platform ships packages for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    RedHat,
    Debian,
    Suse,
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
    pub pretty_name: String,
    pub id_like: Vec<String>,
}

impl OsRelease {
    pub fn family(&self) -> OsFamily {
        let ids = std::iter::once(self.id.as_str()).chain(self.id_like.iter().map(|s| s.as_str()));
        for id in ids {
            match id {
                "rhel" | "centos" | "fedora" | "almalinux" | "rocky" | "ol" | "amzn" => {
                    return OsFamily::RedHat
                }
                "debian" | "ubuntu" => return OsFamily::Debian,
                "suse" | "sles" | "opensuse" | "opensuse-leap" => return OsFamily::Suse,
                _ => {}
            }
        }
        OsFamily::Other
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

pub fn parse_os_release(contents: &str) -> OsRelease {
    let mut rel = OsRelease::default();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value.trim());
        match key.trim() {
            "ID" => rel.id = value.to_string(),
            "VERSION_ID" => rel.version_id = value.to_string(),
            "PRETTY_NAME" => rel.pretty_name = value.to_string(),
            "ID_LIKE" => rel.id_like = value.split_whitespace().map(String::from).collect(),
            _ => {}
        }
    }

    if rel.id.is_empty() {
        rel.id = "linux".to_string();
    }
    if rel.pretty_name.is_empty() {
        rel.pretty_name = if rel.version_id.is_empty() {
            rel.id.clone()
        } else {
            format!("{} {}", rel.id, rel.version_id)
        };
    }
    rel
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: Option<u64>,
    pub available_kb: Option<u64>,
}

/// `available_kb` prefers MemAvailable and falls back to MemFree + Buffers + Cached.
pub fn parse_meminfo(contents: &str) -> MemInfo {
    let mut total = None;
    let mut available = None;
    let mut free_like: Option<u64> = None;

    for line in contents.lines() {
        let Some((key, rest)) = line.trim().split_once(':') else {
            continue;
        };
        let value: Option<u64> = rest.split_whitespace().next().and_then(|v| v.parse().ok());
        match key.trim() {
            "MemTotal" => total = value,
            "MemAvailable" => available = value,
            "MemFree" | "Buffers" | "Cached" => {
                if let Some(v) = value {
                    free_like = Some(free_like.unwrap_or(0) + v);
                }
            }
            _ => {}
        }
    }

    MemInfo {
        total_kb: total,
        available_kb: available.or(free_like),
    }
}

/// Available bytes from `df -Pk <path>` output (second line, fourth column).
pub fn parse_df_available_bytes(output: &str) -> Option<u64> {
    let data = output.lines().nth(1)?;
    let cols: Vec<&str> = data.split_whitespace().collect();
    let avail_kb: u64 = cols.get(3)?.parse().ok()?;
    Some(avail_kb.saturating_mul(1024))
}
