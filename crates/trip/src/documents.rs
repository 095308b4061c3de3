/// Shared per-scope documents: packing list, favorites, hotel shortlist.
/// Each is a plain serde value the sync layer stores and mirrors whole.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Result, TripError};

/// One entry in the packing checklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingItem {
    pub category: String,
    pub name: String,
    pub icon: String,
    pub checked: bool,
    #[serde(default)]
    pub custom: bool,
}

impl PackingItem {
    fn template(category: &str, name: &str, icon: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            checked: false,
            custom: false,
        }
    }
}

/// The packing checklist document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingList {
    pub items: Vec<PackingItem>,
}

impl Default for PackingList {
    fn default() -> Self {
        Self {
            items: default_packing_items(),
        }
    }
}

impl PackingList {
    /// Toggle the checkbox of the `index`-th item within `category`.
    /// Indices are per-category, matching how the list is displayed.
    pub fn toggle_item(&mut self, category: &str, index: usize) -> Result<bool> {
        let item = self
            .items
            .iter_mut()
            .filter(|i| i.category == category)
            .nth(index)
            .ok_or_else(|| TripError::ItemNotFound(format!("{category}#{index}")))?;

        item.checked = !item.checked;
        Ok(item.checked)
    }

    pub fn add_custom_item(
        &mut self,
        category: impl Into<String>,
        name: impl Into<String>,
        icon: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TripError::EmptyField("name"));
        }

        let category = category.into();
        let category = if category.trim().is_empty() {
            "Opcionales".to_string()
        } else {
            category
        };

        let icon = icon.into();
        self.items.push(PackingItem {
            category,
            name: name.trim().to_string(),
            icon: if icon.is_empty() {
                "📦".to_string()
            } else {
                icon
            },
            checked: false,
            custom: true,
        });
        Ok(())
    }

    /// Drop custom items and uncheck everything.
    pub fn reset_to_default(&mut self) {
        self.items = default_packing_items();
    }

    /// (checked, total) for the progress bar
    pub fn progress(&self) -> (usize, usize) {
        let total = self.items.len();
        let checked = self.items.iter().filter(|i| i.checked).count();
        (checked, total)
    }

    pub fn find(&self, name: &str) -> Option<&PackingItem> {
        self.items.iter().find(|i| i.name == name)
    }
}

/// Pre-seeded checklist for a Japan trip
fn default_packing_items() -> Vec<PackingItem> {
    vec![
        PackingItem::template("Documentos", "Pasaporte", "🛂"),
        PackingItem::template("Documentos", "Seguro de viaje", "🏥"),
        PackingItem::template("Documentos", "Boletos de avión", "✈️"),
        PackingItem::template("Documentos", "JR Pass", "🎫"),
        PackingItem::template("Documentos", "Efectivo (yenes)", "💴"),
        PackingItem::template("Electrónicos", "Teléfono móvil", "📱"),
        PackingItem::template("Electrónicos", "Cargador de teléfono", "🔌"),
        PackingItem::template("Electrónicos", "Power bank", "🔋"),
        PackingItem::template("Electrónicos", "Adaptador de enchufe (Tipo A)", "🔌"),
        PackingItem::template("Ropa", "Camisetas (5-7)", "👕"),
        PackingItem::template("Ropa", "Chaqueta / Abrigo", "🧥"),
        PackingItem::template("Ropa", "Zapatos cómodos para caminar", "👟"),
        PackingItem::template("Higiene", "Cepillo y pasta de dientes", "🪥"),
        PackingItem::template("Higiene", "Medicamentos personales", "💊"),
        PackingItem::template("Accesorios", "Mochila pequeña / daypack", "🎒"),
        PackingItem::template("Accesorios", "Paraguas plegable", "☂️"),
        PackingItem::template("Opcionales", "Cuaderno de viaje", "📔"),
        PackingItem::template("Opcionales", "Tapones para oídos", "👂"),
    ]
}

/// Favorited place ids, kept sorted for stable serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteSet {
    pub ids: BTreeSet<String>,
}

impl FavoriteSet {
    /// Returns true if the id is now a favorite.
    pub fn toggle(&mut self, poi_id: impl Into<String>) -> bool {
        let poi_id = poi_id.into();
        if self.ids.remove(&poi_id) {
            false
        } else {
            self.ids.insert(poi_id);
            true
        }
    }

    pub fn contains(&self, poi_id: &str) -> bool {
        self.ids.contains(poi_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A hotel candidate on the group's shortlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub city: String,
    pub price_per_night: Option<u32>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

/// The hotel shortlist document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelList {
    pub hotels: Vec<Hotel>,
}

impl HotelList {
    pub fn add(&mut self, hotel: Hotel) -> Result<()> {
        if hotel.name.trim().is_empty() {
            return Err(TripError::EmptyField("name"));
        }
        // Re-adding an id replaces the entry
        self.hotels.retain(|h| h.id != hotel.id);
        self.hotels.push(hotel);
        Ok(())
    }

    pub fn remove(&mut self, hotel_id: &str) -> Result<()> {
        let before = self.hotels.len();
        self.hotels.retain(|h| h.id != hotel_id);
        if self.hotels.len() == before {
            return Err(TripError::ItemNotFound(hotel_id.to_string()));
        }
        Ok(())
    }
}
