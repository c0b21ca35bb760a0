// Board graph - cities, weighted connections and the map registry
//
// Cities hold up to three houses, one per step. Building costs the slot
// price plus the cheapest connection cost from the builder's network.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::actions::PlayerId;
use crate::errors::{GameError, NotFoundError, PowerGridError, PowerGridResult};

/// Price of the first, second and third house in a city
pub const SLOT_COSTS: [u32; 3] = [10, 15, 20];

pub const DEFAULT_MAP: &str = "germany";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
    pub region: String,
    /// Owners in build order
    #[serde(default)]
    pub slots: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub name: String,
    pub regions: Vec<String>,
    pub cities: HashMap<String, City>,
    pub connections: Vec<Connection>,
}

impl Map {
    /// Build a map, rejecting connections to unknown cities
    pub fn new(
        name: impl Into<String>,
        regions: Vec<String>,
        cities: Vec<City>,
        connections: Vec<Connection>,
    ) -> PowerGridResult<Self> {
        let cities: HashMap<String, City> = cities.into_iter().map(|c| (c.id.clone(), c)).collect();
        for conn in &connections {
            for end in [&conn.from, &conn.to] {
                if !cities.contains_key(end) {
                    return Err(NotFoundError::City {
                        city_id: end.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(Self {
            name: name.into(),
            regions,
            cities,
            connections,
        })
    }

    pub fn city(&self, city_id: &str) -> PowerGridResult<&City> {
        self.cities.get(city_id).ok_or_else(|| {
            NotFoundError::City {
                city_id: city_id.to_string(),
            }
            .into()
        })
    }

    fn adjacency(&self) -> HashMap<&str, Vec<(&str, u32)>> {
        let mut adjacency: HashMap<&str, Vec<(&str, u32)>> = HashMap::new();
        for conn in &self.connections {
            adjacency
                .entry(conn.from.as_str())
                .or_default()
                .push((conn.to.as_str(), conn.cost));
            adjacency
                .entry(conn.to.as_str())
                .or_default()
                .push((conn.from.as_str(), conn.cost));
        }
        adjacency
    }

    /// Cheapest connection cost from any of `sources` to `target`
    fn cheapest_path<'a, I>(&'a self, sources: I, target: &str) -> Option<u32>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let adjacency = self.adjacency();
        let mut dist: HashMap<&str, u32> = HashMap::new();
        let mut heap = BinaryHeap::new();
        for source in sources {
            dist.insert(source, 0);
            heap.push(Reverse((0u32, source)));
        }

        while let Some(Reverse((cost, city))) = heap.pop() {
            if city == target {
                return Some(cost);
            }
            if dist.get(city).is_some_and(|&best| cost > best) {
                continue;
            }
            for &(next, edge) in adjacency.get(city).into_iter().flatten() {
                let candidate = cost + edge;
                if dist.get(next).map_or(true, |&best| candidate < best) {
                    dist.insert(next, candidate);
                    heap.push(Reverse((candidate, next)));
                }
            }
        }
        None
    }

    pub fn shortest_path_cost(&self, from: &str, to: &str) -> Option<u32> {
        self.cheapest_path([from], to)
    }

    /// Connection cost for a player owning `owned` to build in `target`.
    /// The first city of a network is free to connect.
    pub fn connection_cost(&self, owned: &BTreeSet<String>, target: &str) -> Option<u32> {
        if owned.is_empty() {
            return Some(0);
        }
        self.cheapest_path(owned.iter().map(String::as_str), target)
    }

    /// Index of the next free house in `city_id`, if the step allows one
    pub fn next_slot(&self, city_id: &str, step: u8) -> PowerGridResult<usize> {
        let city = self.city(city_id)?;
        let allowed = (step as usize).clamp(1, SLOT_COSTS.len());
        if city.slots.len() >= allowed {
            return Err(GameError::CityFull {
                city_id: city_id.to_string(),
                step,
            }
            .into());
        }
        Ok(city.slots.len())
    }

    /// Slot price plus connection cost for building in `city_id`
    pub fn build_cost(
        &self,
        owned: &BTreeSet<String>,
        city_id: &str,
        step: u8,
    ) -> PowerGridResult<u32> {
        let slot = self.next_slot(city_id, step)?;
        let connection = self
            .connection_cost(owned, city_id)
            .ok_or_else(|| GameError::CityUnreachable {
                city_id: city_id.to_string(),
            })?;
        Ok(SLOT_COSTS[slot] + connection)
    }

    pub fn occupy(&mut self, city_id: &str, player_id: &str) -> PowerGridResult<()> {
        let city = self
            .cities
            .get_mut(city_id)
            .ok_or_else(|| NotFoundError::City {
                city_id: city_id.to_string(),
            })?;
        city.slots.push(player_id.to_string());
        Ok(())
    }

    /// Free every house owned by `player_id`
    pub fn vacate(&mut self, player_id: &str) {
        for city in self.cities.values_mut() {
            city.slots.retain(|owner| owner != player_id);
        }
    }

    pub fn cities_in_region(&self, region: &str) -> Vec<&City> {
        let mut cities: Vec<&City> = self
            .cities
            .values()
            .filter(|c| c.region == region)
            .collect();
        cities.sort_by(|a, b| a.id.cmp(&b.id));
        cities
    }

    pub fn is_connected(&self) -> bool {
        let Some(start) = self.cities.keys().next() else {
            return true;
        };
        let adjacency = self.adjacency();
        let mut seen: HashSet<&str> = HashSet::from([start.as_str()]);
        let mut frontier = vec![start.as_str()];
        while let Some(city) = frontier.pop() {
            for &(next, _) in adjacency.get(city).into_iter().flatten() {
                if seen.insert(next) {
                    frontier.push(next);
                }
            }
        }
        seen.len() == self.cities.len()
    }
}

/// Source of playable maps
pub trait MapLoader: Send + Sync {
    fn load(&self, name: &str) -> PowerGridResult<Map>;
    fn names(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: HashMap<String, Map>,
}

impl MapRegistry {
    /// Registry holding only the built-in maps
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.insert(germany());
        registry
    }

    pub fn insert(&mut self, map: Map) {
        self.maps.insert(map.name.clone(), map);
    }

    /// Load every `*.json` map in `dir`. Broken files are skipped.
    pub fn load_dir(&mut self, dir: &Path) -> PowerGridResult<usize> {
        let entries = fs::read_dir(dir).map_err(|e| {
            PowerGridError::Internal(format!("Cannot read map dir {}: {}", dir.display(), e))
        })?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match load_map_file(&path) {
                Ok(map) => {
                    info!("🗺️ Loaded map '{}' from {}", map.name, path.display());
                    self.insert(map);
                    loaded += 1;
                }
                Err(e) => warn!("⚠️ Skipping map {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }
}

impl MapLoader for MapRegistry {
    fn load(&self, name: &str) -> PowerGridResult<Map> {
        self.maps.get(name).cloned().ok_or_else(|| {
            NotFoundError::Map {
                map: name.to_string(),
            }
            .into()
        })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.maps.keys().cloned().collect();
        names.sort();
        names
    }
}

fn load_map_file(path: &Path) -> PowerGridResult<Map> {
    let raw = fs::read_to_string(path)
        .map_err(|e| PowerGridError::Internal(format!("Cannot read {}: {}", path.display(), e)))?;
    let parsed: Map = serde_json::from_str(&raw)?;
    let map = Map::new(
        parsed.name,
        parsed.regions,
        parsed.cities.into_values().collect(),
        parsed.connections,
    )?;
    if !map.is_connected() {
        return Err(GameError::rule_violation(format!("map '{}' is not connected", map.name)).into());
    }
    Ok(map)
}

/// Built-in five-region map
pub fn germany() -> Map {
    let regions: [(&str, [(&str, &str); 6]); 5] = [
        (
            "north",
            [
                ("flensburg", "Flensburg"),
                ("kiel", "Kiel"),
                ("hamburg", "Hamburg"),
                ("cuxhaven", "Cuxhaven"),
                ("bremen", "Bremen"),
                ("wilhelmshaven", "Wilhelmshaven"),
            ],
        ),
        (
            "east",
            [
                ("rostock", "Rostock"),
                ("berlin", "Berlin"),
                ("magdeburg", "Magdeburg"),
                ("halle", "Halle"),
                ("leipzig", "Leipzig"),
                ("dresden", "Dresden"),
            ],
        ),
        (
            "west",
            [
                ("osnabrueck", "Osnabrück"),
                ("muenster", "Münster"),
                ("essen", "Essen"),
                ("duisburg", "Duisburg"),
                ("duesseldorf", "Düsseldorf"),
                ("dortmund", "Dortmund"),
            ],
        ),
        (
            "central",
            [
                ("hannover", "Hannover"),
                ("braunschweig", "Braunschweig"),
                ("goettingen", "Göttingen"),
                ("kassel", "Kassel"),
                ("erfurt", "Erfurt"),
                ("fulda", "Fulda"),
            ],
        ),
        (
            "south",
            [
                ("frankfurt", "Frankfurt"),
                ("wuerzburg", "Würzburg"),
                ("nuernberg", "Nürnberg"),
                ("stuttgart", "Stuttgart"),
                ("augsburg", "Augsburg"),
                ("muenchen", "München"),
            ],
        ),
    ];

    let edges: [(&str, &str, u32); 46] = [
        ("flensburg", "kiel", 4),
        ("kiel", "hamburg", 8),
        ("hamburg", "cuxhaven", 11),
        ("hamburg", "bremen", 11),
        ("cuxhaven", "bremen", 8),
        ("bremen", "wilhelmshaven", 11),
        ("kiel", "rostock", 19),
        ("hamburg", "rostock", 19),
        ("rostock", "berlin", 22),
        ("hamburg", "hannover", 17),
        ("bremen", "hannover", 10),
        ("bremen", "osnabrueck", 11),
        ("wilhelmshaven", "osnabrueck", 14),
        ("osnabrueck", "muenster", 7),
        ("osnabrueck", "hannover", 16),
        ("muenster", "essen", 6),
        ("muenster", "dortmund", 2),
        ("essen", "duisburg", 0),
        ("essen", "dortmund", 4),
        ("essen", "duesseldorf", 2),
        ("duisburg", "duesseldorf", 4),
        ("dortmund", "kassel", 18),
        ("duesseldorf", "frankfurt", 22),
        ("hannover", "braunschweig", 6),
        ("hannover", "goettingen", 10),
        ("goettingen", "kassel", 5),
        ("braunschweig", "goettingen", 13),
        ("braunschweig", "magdeburg", 10),
        ("magdeburg", "berlin", 10),
        ("magdeburg", "halle", 11),
        ("berlin", "halle", 17),
        ("halle", "leipzig", 0),
        ("leipzig", "dresden", 13),
        ("halle", "erfurt", 6),
        ("dresden", "erfurt", 19),
        ("kassel", "erfurt", 15),
        ("kassel", "fulda", 8),
        ("erfurt", "fulda", 13),
        ("fulda", "frankfurt", 8),
        ("fulda", "wuerzburg", 11),
        ("frankfurt", "wuerzburg", 13),
        ("wuerzburg", "nuernberg", 8),
        ("wuerzburg", "stuttgart", 12),
        ("stuttgart", "augsburg", 15),
        ("nuernberg", "augsburg", 18),
        ("augsburg", "muenchen", 6),
    ];

    let cities: HashMap<String, City> = regions
        .iter()
        .flat_map(|(region, cities)| {
            cities.iter().map(move |(id, name)| City {
                id: id.to_string(),
                name: name.to_string(),
                region: region.to_string(),
                slots: Vec::new(),
            })
        })
        .map(|city| (city.id.clone(), city))
        .collect();
    let connections = edges
        .iter()
        .map(|&(from, to, cost)| Connection {
            from: from.to_string(),
            to: to.to_string(),
            cost,
        })
        .collect();

    Map {
        name: DEFAULT_MAP.to_string(),
        regions: regions.iter().map(|(region, _)| region.to_string()).collect(),
        cities,
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_map_is_connected() {
        let map = germany();
        assert_eq!(map.cities.len(), 30);
        assert_eq!(map.regions.len(), 5);
        assert!(map.is_connected());
        assert_eq!(map.cities_in_region("west").len(), 6);
    }

    #[test]
    fn test_first_city_costs_only_the_slot() {
        let map = germany();
        assert_eq!(map.build_cost(&owned(&[]), "berlin", 1).unwrap(), 10);
    }

    #[test]
    fn test_connection_uses_cheapest_route() {
        let map = germany();
        // essen -> duisburg (0) beats any direct link
        assert_eq!(map.shortest_path_cost("essen", "duisburg"), Some(0));
        // flensburg -> kiel -> hamburg
        assert_eq!(map.shortest_path_cost("flensburg", "hamburg"), Some(12));
        // cheapest source wins
        let network = owned(&["flensburg", "bremen"]);
        assert_eq!(map.connection_cost(&network, "hannover"), Some(10));
        assert_eq!(map.build_cost(&network, "hannover", 1).unwrap(), 20);
    }

    #[test]
    fn test_slots_open_with_step() {
        let mut map = germany();
        map.occupy("kassel", "p1").unwrap();

        let err = map.next_slot("kassel", 1).unwrap_err();
        assert_eq!(err.code(), "CITY_FULL");
        assert_eq!(map.next_slot("kassel", 2).unwrap(), 1);
        assert_eq!(map.build_cost(&owned(&[]), "kassel", 2).unwrap(), 15);

        map.vacate("p1");
        assert_eq!(map.next_slot("kassel", 1).unwrap(), 0);
    }

    #[test]
    fn test_unknown_city() {
        let map = germany();
        let err = map.build_cost(&owned(&[]), "atlantis", 1).unwrap_err();
        assert_eq!(err.code(), "CITY_NOT_FOUND");
    }

    #[test]
    fn test_new_rejects_dangling_connection() {
        let cities = vec![City {
            id: "a".to_string(),
            name: "A".to_string(),
            region: "r".to_string(),
            slots: Vec::new(),
        }];
        let connections = vec![Connection {
            from: "a".to_string(),
            to: "b".to_string(),
            cost: 3,
        }];
        assert!(Map::new("tiny", vec!["r".to_string()], cities, connections).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MapRegistry::builtin();
        assert_eq!(registry.names(), vec!["germany".to_string()]);
        assert!(registry.load("germany").is_ok());
        assert_eq!(registry.load("mars").unwrap_err().code(), "MAP_NOT_FOUND");
    }
}
