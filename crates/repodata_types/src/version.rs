//! Conda-style version ordering.
//!
//! A version string is split into an optional epoch (`N!`), a dotted/
//! underscored sequence of segments, and an optional local version
//! (`+...`, compared last). Each segment is further split into runs of
//! digits and runs of non-digits; digit runs compare numerically, other
//! runs compare case-insensitively with `dev` sorting below everything
//! and `post` sorting above everything at the same position.
//!
//! This mirrors the ordering `rattler_conda_types::version` documents and
//! that `conda_build.conda_interface.VersionOrder` implements.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    raw: String,
    epoch: u64,
    segments: Vec<Vec<Component>>,
    local: Vec<Vec<Component>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Component {
    Dev,
    Numeral(u64),
    Ident(String),
    Post,
}

impl Component {
    fn rank(&self) -> u8 {
        match self {
            Component::Dev => 0,
            Component::Numeral(_) => 1,
            Component::Ident(_) => 1,
            Component::Post => 2,
        }
    }
}

fn split_runs(segment: &str) -> Vec<Component> {
    let mut out = Vec::new();
    let mut chars = segment.chars().peekable();
    let mut buf = String::new();
    let mut in_digits = false;
    let mut started = false;

    while let Some(&c) = chars.peek() {
        let is_digit = c.is_ascii_digit();
        if !started {
            in_digits = is_digit;
            started = true;
        }
        if is_digit == in_digits {
            buf.push(c);
            chars.next();
        } else {
            out.push(make_component(&buf, in_digits));
            buf.clear();
            in_digits = is_digit;
        }
    }
    if !buf.is_empty() {
        out.push(make_component(&buf, in_digits));
    }
    out
}

fn make_component(buf: &str, is_digit: bool) -> Component {
    if is_digit {
        Component::Numeral(buf.parse().unwrap_or(0))
    } else {
        match buf.to_ascii_lowercase().as_str() {
            "dev" => Component::Dev,
            "post" => Component::Post,
            lower => Component::Ident(lower.to_string()),
        }
    }
}

fn parse_segments(s: &str) -> Vec<Vec<Component>> {
    s.split(['.', '_'])
        .map(split_runs)
        .collect()
}

impl Version {
    pub fn parse(raw: &str) -> Version {
        let raw_owned = raw.to_string();
        let (epoch_part, rest) = match raw.split_once('!') {
            Some((e, r)) => (e.parse().unwrap_or(0), r),
            None => (0, raw),
        };
        let (main_part, local_part) = match rest.split_once('+') {
            Some((m, l)) => (m, l),
            None => (rest, ""),
        };
        Version {
            raw: raw_owned,
            epoch: epoch_part,
            segments: parse_segments(main_part),
            local: if local_part.is_empty() {
                Vec::new()
            } else {
                parse_segments(local_part)
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn cmp_component(a: &Component, b: &Component) -> Ordering {
    let rank = a.rank().cmp(&b.rank());
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Component::Numeral(x), Component::Numeral(y)) => x.cmp(y),
        (Component::Ident(x), Component::Ident(y)) => x.cmp(y),
        (Component::Numeral(_), Component::Ident(_)) => Ordering::Greater,
        (Component::Ident(_), Component::Numeral(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn cmp_component_lists(a: &[Component], b: &[Component]) -> Ordering {
    let len = a.len().max(b.len());
    let zero = Component::Numeral(0);
    for i in 0..len {
        let ca = a.get(i).unwrap_or(&zero);
        let cb = b.get(i).unwrap_or(&zero);
        let ord = cmp_component(ca, cb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn cmp_segments(a: &[Vec<Component>], b: &[Vec<Component>]) -> Ordering {
    let len = a.len().max(b.len());
    let empty = Vec::new();
    for i in 0..len {
        let sa = a.get(i).unwrap_or(&empty);
        let sb = b.get(i).unwrap_or(&empty);
        let ord = cmp_component_lists(sa, sb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_segments(&self.segments, &other.segments))
            .then_with(|| cmp_segments(&self.local, &other.local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn equal_versions() {
        assert_eq!(v("1.0"), v("1.0"));
        assert_eq!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn numeric_segment_order() {
        assert!(v("1.2") < v("1.10"));
        assert!(v("1.2") < v("2.0"));
    }

    #[test]
    fn dev_sorts_below_release() {
        assert!(v("1.0.dev0") < v("1.0"));
    }

    #[test]
    fn post_sorts_above_release() {
        assert!(v("1.0.post1") > v("1.0"));
    }

    #[test]
    fn epoch_dominates() {
        assert!(v("1!0.1") > v("2.0"));
    }

    #[test]
    fn local_version_breaks_ties() {
        assert!(v("1.0+local2") > v("1.0+local1"));
        assert!(v("1.0+local1") > v("1.0"));
    }

    #[test]
    fn case_insensitive_idents() {
        assert_eq!(v("1.0RC1").cmp(&v("1.0rc1")), Ordering::Equal);
    }
}
