//! Scroll anchoring for the message list.
//!
//! The host reports its viewport geometry and applies the returned
//! [`ScrollAction`] after rendering a list change.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    pub fn is_near_bottom(&self, threshold: f64) -> bool {
        self.distance_from_bottom() <= threshold
    }

    pub fn anchor(&self) -> ScrollAnchor {
        ScrollAnchor {
            scroll_top: self.scroll_top,
            scroll_height: self.scroll_height,
        }
    }
}

/// Scroll position captured before content is inserted above the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub scroll_top: f64,
    pub scroll_height: f64,
}

impl ScrollAnchor {
    /// `scroll_top` that keeps the same content in view once the list has
    /// grown to `new_scroll_height`.
    pub fn restore(&self, new_scroll_height: f64) -> f64 {
        (new_scroll_height - (self.scroll_height - self.scroll_top)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    None,
    ToBottom,
    Restore(ScrollAnchor),
}

impl ScrollAction {
    pub fn is_none(&self) -> bool {
        matches!(self, ScrollAction::None)
    }
}

/// Decides how each list change moves the viewport.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    viewport: Viewport,
    threshold: f64,
    loading_older: bool,
}

impl ScrollTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            viewport: Viewport::default(),
            threshold,
            loading_older: false,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    /// Start a backward page load. Live messages do not auto-scroll until
    /// [`ScrollTracker::end_page_load`] or [`ScrollTracker::cancel_page_load`].
    pub fn begin_page_load(&mut self) -> ScrollAnchor {
        self.loading_older = true;
        self.viewport.anchor()
    }

    pub fn end_page_load(&mut self, anchor: ScrollAnchor) -> ScrollAction {
        self.loading_older = false;
        ScrollAction::Restore(anchor)
    }

    pub fn cancel_page_load(&mut self) {
        self.loading_older = false;
    }

    /// The local user's own send always jumps to the bottom.
    pub fn on_own_send(&self) -> ScrollAction {
        ScrollAction::ToBottom
    }

    /// A message that arrived from elsewhere. Follows the bottom only if the
    /// viewport was already there.
    pub fn on_incoming(&self) -> ScrollAction {
        if !self.loading_older && self.viewport.is_near_bottom(self.threshold) {
            ScrollAction::ToBottom
        } else {
            ScrollAction::None
        }
    }
}
