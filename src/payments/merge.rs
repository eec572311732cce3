//! Reconciliation of optional string fields

/// How an incoming optional value is reconciled with the one already held.
///
/// A blank incoming value never replaces a present one under any policy;
/// clearing a field is done by assigning `None` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Take the incoming value whenever it is present.
    Overwrite,
    /// Keep the current value; take the incoming one only to fill a gap.
    KeepIfAbsent,
    /// Keep whichever value is longer (the current one on ties).
    KeepLonger,
}

impl MergePolicy {
    pub fn apply(self, target: &mut Option<String>, incoming: Option<&str>) {
        let incoming = match incoming.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => return,
        };

        let current_len = target
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::len);

        let replace = match (self, current_len) {
            (_, None) => true,
            (MergePolicy::Overwrite, Some(_)) => true,
            (MergePolicy::KeepIfAbsent, Some(_)) => false,
            (MergePolicy::KeepLonger, Some(len)) => incoming.len() > len,
        };

        if replace {
            *target = Some(incoming.to_string());
        }
    }

    pub fn merge(self, current: Option<String>, incoming: Option<&str>) -> Option<String> {
        let mut target = current;
        self.apply(&mut target, incoming);
        target
    }
}

/// Trimmed, non-blank view of an optional string.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
