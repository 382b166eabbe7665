use crate::core::geo::LatLng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Place-name categories, declared in priority order: lower index wins
/// collisions and appears at lower zooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelKind {
    Continent,
    Country,
    State,
    #[serde(alias = "city_large", alias = "city-large")]
    CityLarge,
    #[serde(alias = "city_medium", alias = "city-medium")]
    CityMedium,
    #[serde(alias = "city_small", alias = "city-small")]
    CitySmall,
}

impl LabelKind {
    pub const ALL: [LabelKind; 6] = [
        LabelKind::Continent,
        LabelKind::Country,
        LabelKind::State,
        LabelKind::CityLarge,
        LabelKind::CityMedium,
        LabelKind::CitySmall,
    ];

    /// Position in the total order; 0 is the highest priority.
    pub fn priority(self) -> usize {
        match self {
            LabelKind::Continent => 0,
            LabelKind::Country => 1,
            LabelKind::State => 2,
            LabelKind::CityLarge => 3,
            LabelKind::CityMedium => 4,
            LabelKind::CitySmall => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::Continent => "continent",
            LabelKind::Country => "country",
            LabelKind::State => "state",
            LabelKind::CityLarge => "cityLarge",
            LabelKind::CityMedium => "cityMedium",
            LabelKind::CitySmall => "citySmall",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "continent" => Ok(LabelKind::Continent),
            "country" => Ok(LabelKind::Country),
            "state" | "province" => Ok(LabelKind::State),
            "citylarge" => Ok(LabelKind::CityLarge),
            "citymedium" => Ok(LabelKind::CityMedium),
            "citysmall" => Ok(LabelKind::CitySmall),
            _ => Err(()),
        }
    }
}

/// Small copyable set of [`LabelKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KindSet(u8);

impl KindSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::from_kinds(&LabelKind::ALL)
    }

    pub fn from_kinds(kinds: &[LabelKind]) -> Self {
        kinds.iter().fold(Self::empty(), |set, k| set.with(*k))
    }

    pub fn with(self, kind: LabelKind) -> Self {
        Self(self.0 | (1 << kind.priority()))
    }

    pub fn contains(&self, kind: LabelKind) -> bool {
        self.0 & (1 << kind.priority()) != 0
    }

    pub fn is_superset_of(&self, other: &KindSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(&self, other: &KindSet) -> KindSet {
        Self(self.0 | other.0)
    }

    /// Kinds in `self` that are not in `other`
    pub fn difference(&self, other: &KindSet) -> KindSet {
        Self(self.0 & !other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in priority order
    pub fn iter(&self) -> impl Iterator<Item = LabelKind> + '_ {
        LabelKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    pub fn to_vec(&self) -> Vec<LabelKind> {
        self.iter().collect()
    }
}

impl FromIterator<LabelKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = LabelKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, k| set.with(k))
    }
}

/// One decoded place name from a tile payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFeature {
    pub lon: f64,
    pub lat: f64,
    pub name: String,
    pub kind: LabelKind,
}

impl LabelFeature {
    pub fn new(lon: f64, lat: f64, name: impl Into<String>, kind: LabelKind) -> Self {
        Self {
            lon,
            lat,
            name: name.into(),
            kind,
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }
}
