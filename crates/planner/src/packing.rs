/// Packing checklist. Individual by default, shared once a trip is
/// active; checkbox toggles render instantly and survive offline via the
/// local fallback copy.
use sync::{DocSync, RenderFn};
use trip::PackingList;

use crate::{Result, Services};

pub struct PackingListFeature {
    sync: DocSync<PackingList>,
}

impl PackingListFeature {
    pub fn new(services: &Services, render: RenderFn<PackingList>) -> Self {
        Self {
            sync: DocSync::new(
                services.store.clone(),
                services.fallback.clone(),
                services.resolver(),
                "packing",
                "packingList",
                PackingList::default,
                render,
            ),
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.sync.start().await?;
        Ok(())
    }

    /// Call after a trip switch or login/logout
    pub async fn reinitialize(&self) -> Result<()> {
        self.sync.resync().await?;
        Ok(())
    }

    pub async fn toggle_item(&self, category: &str, index: usize) -> Result<()> {
        self.sync
            .mutate(|list| {
                list.toggle_item(category, index)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn add_custom_item(&self, category: &str, name: &str, icon: &str) -> Result<()> {
        self.sync
            .mutate(|list| {
                list.add_custom_item(category, name, icon)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn reset_to_default(&self) -> Result<()> {
        self.sync
            .mutate(|list| {
                list.reset_to_default();
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub fn progress(&self) -> (usize, usize) {
        self.sync.current().progress()
    }

    pub fn current(&self) -> PackingList {
        self.sync.current()
    }

    pub fn is_offline(&self) -> bool {
        self.sync.is_offline()
    }

    pub fn stop(&self) {
        self.sync.stop();
    }
}
