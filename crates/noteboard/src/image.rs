#![forbid(unsafe_code)]

//! Images referenced by notes.
//!
//! Images are owned by an [`ImageStorage`]; notes only keep a weak
//! back-reference. Destroying an image is an explicit event: the session
//! removes it from storage and then calls
//! [`release_image`](crate::model::Board::release_image) so notes showing
//! it lose it, whoever else still holds the image.

use std::fmt;
use std::num::NonZeroU32;
use std::rc::Rc;

/// Identifier of a stored image. Zero is reserved for "no image".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(NonZeroU32);

impl ImageId {
    /// Returns `None` for the reserved id 0.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0.get()
    }

    /// Wire form of an optional image: the id, or 0.
    #[must_use]
    pub fn to_wire(image: Option<Self>) -> u32 {
        image.map_or(0, Self::raw)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub id: ImageId,
    pub path: String,
    pub name: String,
}

impl StoredImage {
    /// Path relative to the board page.
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("../img/{}", self.path)
    }
}

/// Looks up images by id when replaying snapshots.
pub trait ImageResolver {
    fn resolve(&mut self, id: ImageId) -> Option<Rc<StoredImage>>;
}

/// Owner of the images known to the client.
#[derive(Debug, Default)]
pub struct ImageStorage {
    images: Vec<Rc<StoredImage>>,
}

impl ImageStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image, replacing any previous image with the same id.
    pub fn add(
        &mut self,
        id: ImageId,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Rc<StoredImage> {
        let image = Rc::new(StoredImage {
            id,
            path: path.into(),
            name: name.into(),
        });
        match self.images.iter_mut().find(|img| img.id == id) {
            Some(slot) => *slot = Rc::clone(&image),
            None => self.images.push(Rc::clone(&image)),
        }
        image
    }

    /// The image with `id`, registering it under `path` if unknown.
    pub fn get_or_add(&mut self, id: ImageId, path: &str) -> Rc<StoredImage> {
        match self.get(id) {
            Some(image) => image,
            None => self.add(id, path, path),
        }
    }

    #[must_use]
    pub fn get(&self, id: ImageId) -> Option<Rc<StoredImage>> {
        self.images.iter().find(|img| img.id == id).cloned()
    }

    /// Drop the storage's reference to `id`. Returns whether it was known.
    pub fn destroy(&mut self, id: ImageId) -> bool {
        let before = self.images.len();
        self.images.retain(|img| img.id != id);
        before != self.images.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<StoredImage>> {
        self.images.iter()
    }
}

impl ImageResolver for ImageStorage {
    fn resolve(&mut self, id: ImageId) -> Option<Rc<StoredImage>> {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> ImageId {
        ImageId::new(raw).expect("non-zero image id")
    }

    #[test]
    fn zero_is_no_image() {
        assert!(ImageId::new(0).is_none());
        assert_eq!(ImageId::to_wire(None), 0);
        assert_eq!(ImageId::to_wire(Some(id(9))), 9);
    }

    #[test]
    fn add_replaces_same_id() {
        let mut storage = ImageStorage::new();
        storage.add(id(1), "a.png", "a");
        storage.add(id(1), "b.png", "b");
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(id(1)).unwrap().path, "b.png");
    }

    #[test]
    fn get_or_add_reuses_existing() {
        let mut storage = ImageStorage::new();
        let first = storage.get_or_add(id(2), "x.png");
        let second = storage.get_or_add(id(2), "y.png");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.full_path(), "../img/x.png");
    }

    #[test]
    fn destroy_releases_weak_references() {
        let mut storage = ImageStorage::new();
        let weak = Rc::downgrade(&storage.add(id(3), "c.png", "c"));
        assert!(weak.upgrade().is_some());

        assert!(storage.destroy(id(3)));
        assert!(weak.upgrade().is_none());
        assert!(!storage.destroy(id(3)));
        assert!(storage.resolve(id(3)).is_none());
    }
}
