//! Gallery navigation: one image per page with previous/next controls
//!
//! The current position is never stored server side. Each control carries the
//! target index in its callback payload.

use std::path::PathBuf;

use super::callback_payload::CallbackPayload;
use crate::user_state::{UserId, UserRepository};

/// One rendered gallery page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryPage {
    pub image: PathBuf,
    pub index: usize,
    pub total: usize,
    pub previous: Option<CallbackPayload>,
    pub next: Option<CallbackPayload>,
}

/// Result of a gallery render request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryView {
    /// The user has no images at all
    Empty,
    /// The requested index is outside the gallery
    Unavailable { index: usize, total: usize },
    Page(GalleryPage),
}

/// Compute the previous/next controls for `index` in a gallery of `total` images
pub fn navigation_controls(
    user: UserId,
    index: usize,
    total: usize,
) -> (Option<CallbackPayload>, Option<CallbackPayload>) {
    let previous = (index > 0).then(|| CallbackPayload::GalleryNav {
        user,
        index: index - 1,
    });
    let next = (index + 1 < total).then(|| CallbackPayload::GalleryNav {
        user,
        index: index + 1,
    });
    (previous, next)
}

/// Render the gallery page at `index` for `user`
///
/// Out-of-range indexes are rejected, never clamped. Nothing is mutated.
pub fn render(users: &dyn UserRepository, user: UserId, index: usize) -> GalleryView {
    let total = users.gallery_len(user);
    if total == 0 {
        return GalleryView::Empty;
    }

    let Some(image) = users.gallery_image(user, index) else {
        return GalleryView::Unavailable { index, total };
    };

    let (previous, next) = navigation_controls(user, index, total);
    GalleryView::Page(GalleryPage {
        image,
        index,
        total,
        previous,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_state::InMemoryUserStore;

    fn store_with_images(user: UserId, count: usize) -> InMemoryUserStore {
        let store = InMemoryUserStore::new();
        for i in 0..count {
            store.append_gallery_image(user, PathBuf::from(format!("img_{i}.jpg")));
        }
        store
    }

    #[test]
    fn test_empty_gallery() {
        let store = InMemoryUserStore::new();
        assert_eq!(render(&store, 1, 0), GalleryView::Empty);
    }

    #[test]
    fn test_out_of_range_is_unavailable() {
        let store = store_with_images(1, 2);
        assert_eq!(
            render(&store, 1, 2),
            GalleryView::Unavailable { index: 2, total: 2 }
        );
        assert_eq!(store.gallery_len(1), 2);
    }

    #[test]
    fn test_controls_follow_position() {
        for total in 1..=4usize {
            for index in 0..total {
                let (previous, next) = navigation_controls(5, index, total);
                assert_eq!(previous.is_some(), index > 0, "prev at {index}/{total}");
                assert_eq!(next.is_some(), index < total - 1, "next at {index}/{total}");
            }
        }
    }

    #[test]
    fn test_middle_page() {
        let store = store_with_images(3, 3);
        let GalleryView::Page(page) = render(&store, 3, 1) else {
            panic!("expected a page");
        };

        assert_eq!(page.image, PathBuf::from("img_1.jpg"));
        assert_eq!(page.total, 3);
        assert_eq!(
            page.previous,
            Some(CallbackPayload::GalleryNav { user: 3, index: 0 })
        );
        assert_eq!(
            page.next,
            Some(CallbackPayload::GalleryNav { user: 3, index: 2 })
        );
    }

    #[test]
    fn test_single_image_has_no_controls() {
        let store = store_with_images(8, 1);
        let GalleryView::Page(page) = render(&store, 8, 0) else {
            panic!("expected a page");
        };
        assert!(page.previous.is_none());
        assert!(page.next.is_none());
    }
}
