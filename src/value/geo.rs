//! Member -> (longitude, latitude) map with haversine distance queries.
use crate::error::Error;
use bytes::Bytes;
use std::collections::HashMap;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unit {
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl Unit {
    pub fn parse(s: &[u8]) -> Result<Self, Error> {
        match String::from_utf8_lossy(s).to_lowercase().as_str() {
            "m" => Ok(Self::Meters),
            "km" => Ok(Self::Kilometers),
            "mi" => Ok(Self::Miles),
            "ft" => Ok(Self::Feet),
            other => Err(Error::Syntax(format!("unsupported unit '{}'", other))),
        }
    }

    fn from_km(self, km: f64) -> f64 {
        match self {
            Self::Kilometers => km,
            Self::Meters => km * 1000.0,
            Self::Miles => km * 0.621_371,
            Self::Feet => km * 3280.84,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoSet {
    members: HashMap<Bytes, (f64, f64)>,
}

impl GeoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if `member` was newly added (did not already exist).
    pub fn add(&mut self, member: Bytes, lon: f64, lat: f64) -> Result<bool, Error> {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::GeoRange(lon, lat));
        }
        Ok(self.members.insert(member, (lon, lat)).is_none())
    }

    pub fn get(&self, member: &Bytes) -> Option<(f64, f64)> {
        self.members.get(member).copied()
    }

    /// Every member and its coordinates, in arbitrary order. Used by RDB save.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, (f64, f64))> {
        self.members.iter().map(|(m, coords)| (m, *coords))
    }

    pub fn dist(&self, m1: &Bytes, m2: &Bytes, unit: Unit) -> Option<f64> {
        let a = self.get(m1)?;
        let b = self.get(m2)?;
        Some(unit.from_km(haversine_km(a, b)))
    }

    /// Members within `radius` (in `unit`) of `(lon, lat)`, linear scan.
    pub fn radius(&self, lon: f64, lat: f64, radius: f64, unit: Unit) -> Vec<(Bytes, f64)> {
        self.members
            .iter()
            .filter_map(|(member, coords)| {
                let d = unit.from_km(haversine_km((lon, lat), *coords));
                if d <= radius {
                    Some((member.clone(), d))
                } else {
                    None
                }
            })
            .collect()
    }
}

fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = a;
    let (lon2, lat2) = b;
    let (lat1, lat2, dlat, dlon) = (
        lat1.to_radians(),
        lat2.to_radians(),
        (lat2 - lat1).to_radians(),
        (lon2 - lon1).to_radians(),
    );
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        let mut g = GeoSet::new();
        assert_eq!(Err(Error::GeoRange(200.0, 0.0)), g.add("a".into(), 200.0, 0.0));
    }

    #[test]
    fn dist_between_known_points() {
        let mut g = GeoSet::new();
        g.add("a".into(), 13.361389, 38.115556).unwrap();
        g.add("b".into(), 15.087269, 37.502669).unwrap();
        let d = g.dist(&"a".into(), &"b".into(), Unit::Kilometers).unwrap();
        assert!((d - 166.27).abs() < 1.0);
    }

    #[test]
    fn radius_search_includes_self() {
        let mut g = GeoSet::new();
        g.add("a".into(), 0.0, 0.0).unwrap();
        g.add("b".into(), 50.0, 0.0).unwrap();
        let hits = g.radius(0.0, 0.0, 10.0, Unit::Kilometers);
        assert_eq!(1, hits.len());
        assert_eq!(Bytes::from("a"), hits[0].0);
    }
}
