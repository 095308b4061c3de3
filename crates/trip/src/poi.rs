/// Minimal point-of-interest catalog. The real catalog lives server-side;
/// this slice backs favorites and search in tests and demos.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub city: String,
    pub category: String,
    pub rating: f32,
}

impl Poi {
    fn new(id: &str, name: &str, city: &str, category: &str, rating: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            city: city.to_string(),
            category: category.to_string(),
            rating,
        }
    }
}

/// Built-in sample catalog
pub fn sample_catalog() -> Vec<Poi> {
    vec![
        Poi::new("tokyo-sensoji", "Templo Senso-ji", "Tokyo", "culture", 4.8),
        Poi::new("tokyo-shibuya-crossing", "Cruce de Shibuya", "Tokyo", "sightseeing", 4.7),
        Poi::new("tokyo-ichiran-shibuya", "Ichiran Ramen (Shibuya)", "Tokyo", "food", 4.6),
        Poi::new("tokyo-skytree", "Tokyo Skytree", "Tokyo", "sightseeing", 4.6),
        Poi::new("kyoto-fushimi-inari", "Fushimi Inari Taisha", "Kyoto", "culture", 4.9),
    ]
}

pub fn pois_by_city<'a>(catalog: &'a [Poi], city: &str) -> Vec<&'a Poi> {
    let city = city.to_lowercase();
    catalog
        .iter()
        .filter(|p| p.city.to_lowercase() == city)
        .collect()
}

pub fn search_pois<'a>(catalog: &'a [Poi], query: &str) -> Vec<&'a Poi> {
    let query = query.to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    catalog
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_filter_is_case_insensitive() {
        let catalog = sample_catalog();
        let tokyo = pois_by_city(&catalog, "tokyo");
        assert_eq!(tokyo.len(), 4);
    }

    #[test]
    fn test_search_matches_name() {
        let catalog = sample_catalog();
        let hits = search_pois(&catalog, "ramen");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "tokyo-ichiran-shibuya");

        assert!(search_pois(&catalog, "").is_empty());
    }
}
