/// Label used when neither the structured format nor the amenities name a premium format.
pub const STANDARD: &str = "Standard";

/// Picks the presentation format for an amenity group.
#[derive(Debug, Clone)]
pub struct FormatResolver {
    premium: Vec<String>,
}

impl FormatResolver {
    pub fn new<I, S>(premium: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            premium: premium.into_iter().map(Into::into).collect(),
        }
    }

    /// An explicit label other than "Standard" wins. Otherwise the first
    /// amenity that is a known premium format, in listing order. Otherwise
    /// "Standard".
    pub fn resolve(&self, raw_label: Option<&str>, amenities: &[String]) -> String {
        if let Some(label) = raw_label.map(str::trim)
            && !label.is_empty()
            && label != STANDARD
        {
            return label.to_string();
        }

        amenities
            .iter()
            .find(|a| self.premium.iter().any(|p| p == a.as_str()))
            .cloned()
            .unwrap_or_else(|| STANDARD.to_string())
    }
}
