/// Hotel shortlist shared by the group
use sync::{DocSync, RenderFn};
use trip::{ActivityKind, Hotel, HotelList};

use crate::{ActivityFeed, Result, Services};

pub struct HotelListFeature {
    services: Services,
    sync: DocSync<HotelList>,
}

impl HotelListFeature {
    pub fn new(services: &Services, render: RenderFn<HotelList>) -> Self {
        Self {
            services: services.clone(),
            sync: DocSync::new(
                services.store.clone(),
                services.fallback.clone(),
                services.resolver(),
                "hotels",
                "hotelList",
                HotelList::default,
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

    pub async fn add_hotel(&self, hotel: Hotel) -> Result<()> {
        let name = hotel.name.clone();
        self.sync
            .mutate(move |hotels| {
                hotels.add(hotel)?;
                Ok(())
            })
            .await?;

        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::HotelAdded, &name)
            .await;
        Ok(())
    }

    pub async fn remove_hotel(&self, hotel_id: &str) -> Result<()> {
        self.sync
            .mutate(|hotels| {
                hotels.remove(hotel_id)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub fn current(&self) -> HotelList {
        self.sync.current()
    }

    pub fn stop(&self) {
        self.sync.stop();
    }
}
