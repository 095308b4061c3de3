/// Favorited places. Individual until a trip is active, then the group
/// shares one set.
use sync::{DocSync, RenderFn};
use trip::FavoriteSet;

use crate::{Result, Services};

pub struct FavoritesFeature {
    sync: DocSync<FavoriteSet>,
}

impl FavoritesFeature {
    pub fn new(services: &Services, render: RenderFn<FavoriteSet>) -> Self {
        Self {
            sync: DocSync::new(
                services.store.clone(),
                services.fallback.clone(),
                services.resolver(),
                "favorites",
                "favorites",
                FavoriteSet::default,
                render,
            ),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.sync.start().await?;
        Ok(())
    }

    pub async fn reinitialize(&self) -> Result<()> {
        self.sync.resync().await?;
        Ok(())
    }

    /// Returns whether the place is a favorite after the toggle
    pub async fn toggle(&self, poi_id: &str) -> Result<bool> {
        self.sync
            .mutate(|favorites| {
                favorites.toggle(poi_id);
                Ok(())
            })
            .await?;
        Ok(self.sync.current().contains(poi_id))
    }

    pub fn is_favorite(&self, poi_id: &str) -> bool {
        self.sync.current().contains(poi_id)
    }

    pub fn current(&self) -> FavoriteSet {
        self.sync.current()
    }

    pub fn stop(&self) {
        self.sync.stop();
    }
}
