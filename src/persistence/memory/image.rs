use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    models::Image,
    persistence::{ImagePersistence, ImageQuery, Persistable, Persistence, SortOrder},
};

#[derive(Debug, Default)]
pub struct ImageMemoryPersistence {
    models: Arc<Mutex<HashMap<String, Image>>>,
}

#[async_trait]
impl Persistence<Image> for ImageMemoryPersistence {
    async fn upsert(&self, image: &Image) -> anyhow::Result<u64> {
        let mut locked_images = self.get_models_locked()?;

        locked_images.insert(image.get_id(), image.clone());

        Ok(1)
    }

    async fn delete(&self, image_id: &str) -> anyhow::Result<u64> {
        let mut locked_images = self.get_models_locked()?;

        match locked_images.remove(image_id) {
            Some(_) => Ok(1),
            None => Ok(0),
        }
    }

    async fn get_by_id(&self, image_id: &str) -> anyhow::Result<Option<Image>> {
        let locked_images = self.get_models_locked()?;

        Ok(locked_images.get(image_id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<Image>> {
        let locked_images = self.get_models_locked()?;

        Ok(locked_images.values().cloned().collect())
    }
}

#[async_trait]
impl ImagePersistence for ImageMemoryPersistence {
    async fn get_by_app_name(&self, app_name: &str) -> anyhow::Result<Vec<Image>> {
        let locked_images = self.get_models_locked()?;

        let images = locked_images
            .values()
            .filter(|image| image.app_name == app_name)
            .cloned()
            .collect();

        Ok(images)
    }

    async fn query(&self, query: &ImageQuery) -> anyhow::Result<Vec<Image>> {
        let mut images = self.filtered(query)?;

        images.sort_by_key(|image| sort_key(image, &query.sort_field));
        if query.order == SortOrder::Descending {
            images.reverse();
        }

        Ok(images
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, query: &ImageQuery) -> anyhow::Result<u64> {
        Ok(self.filtered(query)?.len() as u64)
    }
}

impl ImageMemoryPersistence {
    fn filtered(&self, query: &ImageQuery) -> anyhow::Result<Vec<Image>> {
        let locked_images = self.get_models_locked()?;

        let images = locked_images
            .values()
            .filter(|image| {
                matches_substring(&image.app_name, &query.app_name)
                    && matches_substring(&image.tag, &query.image_tag)
            })
            .cloned()
            .collect();

        Ok(images)
    }

    fn get_models_locked(&self) -> anyhow::Result<MutexGuard<HashMap<String, Image>>> {
        match self.models.lock() {
            Ok(locked_images) => Ok(locked_images),
            Err(_) => Err(anyhow::anyhow!("failed to acquire lock")),
        }
    }
}

fn matches_substring(value: &str, filter: &Option<String>) -> bool {
    match filter {
        Some(filter) => value.contains(filter.as_str()),
        None => true,
    }
}

fn sort_key(image: &Image, field: &str) -> String {
    match field {
        "image_tag" | "tag" => image.tag.clone(),
        _ => image.app_name.clone(),
    }
}
