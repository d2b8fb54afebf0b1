//! Atlas provider interface and lifecycle notifications.
//!
//! Labels never reach for a global cache: they hold a
//! [`SharedProvider`] and acquire/release atlases through it. Every
//! successful `atlas_*` call adds one reference that must be paired with
//! exactly one [`FontAtlasProvider::release`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use glam::Vec2;

use crate::atlas::{AtlasHandle, AtlasId};
use crate::error::FontError;
use crate::page::TextureInfo;
use crate::style::{FontDefinition, TtfConfig};

/// Provider shared by every label of a scene.
pub type SharedProvider = Rc<RefCell<dyn FontAtlasProvider>>;

/// Handle returned by [`FontAtlasProvider::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Atlas lifecycle signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtlasEvent {
    /// The atlas dropped its textures; batches built on it are stale.
    Purged(AtlasId),
    /// The atlas may be re-acquired and rebuilt.
    Reset(AtlasId),
}

impl AtlasEvent {
    pub fn atlas_id(&self) -> AtlasId {
        match *self {
            AtlasEvent::Purged(id) | AtlasEvent::Reset(id) => id,
        }
    }
}

/// Receives atlas lifecycle signals. Providers hold observers weakly.
pub trait AtlasObserver {
    fn on_atlas_event(&self, event: AtlasEvent);
}

/// Observer that queues events until the owner drains them.
#[derive(Default)]
pub struct AtlasMailbox {
    events: RefCell<VecDeque<AtlasEvent>>,
}

impl AtlasMailbox {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn drain(&self) -> Vec<AtlasEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl AtlasObserver for AtlasMailbox {
    fn on_atlas_event(&self, event: AtlasEvent) {
        self.events.borrow_mut().push_back(event);
    }
}

/// Source image for a fixed-grid character map.
#[derive(Clone, Debug, PartialEq)]
pub enum CharMapSource {
    /// An already-registered texture.
    Texture {
        texture: TextureInfo,
        item_width: u32,
        item_height: u32,
        start_char: u32,
    },
    /// An image file; its size is read from the file header.
    File {
        path: PathBuf,
        item_width: u32,
        item_height: u32,
        start_char: u32,
    },
}

/// A whole string rendered into one texture by a system font.
#[derive(Clone, Debug)]
pub struct StringTexture {
    pub texture: TextureInfo,
    /// RGBA pixels, `texture.width * texture.height * 4` bytes.
    pub pixels: Vec<u8>,
    /// Logical size of the rendered text box.
    pub size: Vec2,
}

/// Font atlas acquisition and system-font rendering.
pub trait FontAtlasProvider {
    /// Acquire the atlas for a TrueType configuration.
    fn atlas_ttf(&mut self, config: &TtfConfig) -> Result<AtlasHandle, FontError>;

    /// Acquire a BMFont atlas. `image_offset` shifts every glyph rect when
    /// the font image is packed into a larger texture.
    fn atlas_fnt(&mut self, path: &str, image_offset: Vec2) -> Result<AtlasHandle, FontError>;

    /// Acquire a fixed-grid character map atlas.
    fn atlas_char_map(&mut self, source: &CharMapSource) -> Result<AtlasHandle, FontError>;

    /// Give back one reference obtained from an `atlas_*` call.
    fn release(&mut self, atlas: &AtlasHandle);

    /// Render a whole string with a system font.
    fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError>;

    fn subscribe(&mut self, observer: Weak<dyn AtlasObserver>) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// Weak observer list shared by provider implementations.
#[derive(Default)]
pub struct ObserverList {
    next_id: u64,
    observers: Vec<(SubscriptionId, Weak<dyn AtlasObserver>)>,
}

impl ObserverList {
    pub fn subscribe(&mut self, observer: Weak<dyn AtlasObserver>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.observers.retain(|(sub, _)| *sub != id);
    }

    /// Deliver to live observers, pruning dead ones.
    pub fn notify(&mut self, event: AtlasEvent) {
        self.observers.retain(|(_, weak)| match weak.upgrade() {
            Some(observer) => {
                observer.on_atlas_event(event);
                true
            }
            None => false,
        });
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_queues_in_order() {
        let mailbox = AtlasMailbox::new();
        mailbox.on_atlas_event(AtlasEvent::Purged(3));
        mailbox.on_atlas_event(AtlasEvent::Reset(3));
        assert_eq!(mailbox.drain(), vec![AtlasEvent::Purged(3), AtlasEvent::Reset(3)]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_observer_list_prunes_dropped_observers() {
        let mut list = ObserverList::default();
        let kept = AtlasMailbox::new();
        let dropped = AtlasMailbox::new();
        let kept_weak: Weak<dyn AtlasObserver> = Rc::downgrade(&kept) as Weak<dyn AtlasObserver>;
        let dropped_weak: Weak<dyn AtlasObserver> =
            Rc::downgrade(&dropped) as Weak<dyn AtlasObserver>;
        list.subscribe(kept_weak);
        list.subscribe(dropped_weak);
        drop(dropped);

        list.notify(AtlasEvent::Purged(1));
        assert_eq!(list.len(), 1);
        assert_eq!(kept.drain(), vec![AtlasEvent::Purged(1)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut list = ObserverList::default();
        let mailbox = AtlasMailbox::new();
        let weak: Weak<dyn AtlasObserver> = Rc::downgrade(&mailbox) as Weak<dyn AtlasObserver>;
        let id = list.subscribe(weak);
        list.unsubscribe(id);
        list.notify(AtlasEvent::Reset(9));
        assert!(mailbox.is_empty());
        assert!(list.is_empty());
    }

    #[test]
    fn test_event_atlas_id() {
        assert_eq!(AtlasEvent::Purged(4).atlas_id(), 4);
        assert_eq!(AtlasEvent::Reset(5).atlas_id(), 5);
    }
}
