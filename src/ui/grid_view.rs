//! GTK host for [`GridEngine`].
//!
//! A `DrawingArea` sized to the full content height inside a
//! `ScrolledWindow`. Only the engine's visible window is painted. Per-cell
//! overlay renderers live while their cell is visible and are dropped,
//! releasing their surfaces, when it scrolls out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use gtk4::cairo;
use gtk4::prelude::*;
use gtk4::{DrawingArea, PolicyType, ScrolledWindow};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::{GridPreferences, PreferenceStore, ZoomLevel};
use crate::engine::{GridEngine, VisibleCell};
use crate::feed::{page_channel_with_waker, PageReceiver, PageSender, PageSource};
use crate::layout::ResizeEffect;
use crate::models::{ImageId, ImageRecord};
use crate::overlay::{LodOverlayRenderer, RenderOutcome, SurfaceFactory};
use crate::ui::frame_clock::GlibFrameScheduler;

/// Cell overlay plus the cairo copy of its last drawn pixels.
struct CellOverlay {
    renderer: LodOverlayRenderer,
    painted: Option<cairo::ImageSurface>,
}

struct GridState {
    engine: GridEngine,
    overlays: HashMap<ImageId, CellOverlay>,
    factory: Rc<dyn SurfaceFactory>,
    zoom: ZoomLevel,
    prefs_key: String,
    prefs: Rc<PreferenceStore>,
}

pub struct GridView {
    scrolled: ScrolledWindow,
    area: DrawingArea,
    state: Rc<RefCell<GridState>>,
}

impl GridView {
    /// Builds the widget for the collection `prefs_key`, restoring its
    /// saved zoom and spacing.
    pub fn new(
        prefs_key: &str,
        prefs: Rc<PreferenceStore>,
        factory: Rc<dyn SurfaceFactory>,
    ) -> Rc<Self> {
        let saved = prefs.load(prefs_key);
        let scheduler = GlibFrameScheduler::new();
        let engine = GridEngine::new(saved.to_config(0.0), Box::new(scheduler.clone()));

        let area = DrawingArea::new();
        let scrolled = ScrolledWindow::builder()
            .hscrollbar_policy(PolicyType::Never)
            .hexpand(true)
            .vexpand(true)
            .child(&area)
            .build();

        let view = Rc::new(Self {
            scrolled,
            area,
            state: Rc::new(RefCell::new(GridState {
                engine,
                overlays: HashMap::new(),
                factory,
                zoom: saved.zoom,
                prefs_key: prefs_key.to_string(),
                prefs,
            })),
        });

        let weak = Rc::downgrade(&view);
        scheduler.set_callback(move || {
            if let Some(view) = weak.upgrade() {
                view.on_frame();
            }
        });
        view.setup_draw();
        view.setup_scroll();
        view.setup_resize_observer();
        view
    }

    pub fn widget(&self) -> &ScrolledWindow {
        &self.scrolled
    }

    /// Creates the page channel for a source. Deliveries wake the main
    /// loop, which drains them into the engine.
    pub fn page_channel(self: &Rc<Self>) -> (PageSender, PageReceiver) {
        let (wake_tx, wake_rx) = async_channel::unbounded::<()>();
        let weak = Rc::downgrade(self);
        glib::spawn_future_local(async move {
            while wake_rx.recv().await.is_ok() {
                let Some(view) = weak.upgrade() else {
                    break;
                };
                let added = view.state.borrow_mut().engine.poll_pages();
                if added > 0 {
                    debug!(added, "Pages delivered to grid");
                }
            }
        });
        page_channel_with_waker(Arc::new(move || {
            let _ = wake_tx.try_send(());
        }))
    }

    pub fn attach_source(&self, source: Box<dyn PageSource>, pages: PageReceiver) {
        self.state.borrow_mut().engine.attach_source(source, pages);
    }

    pub fn set_images(&self, images: Vec<ImageRecord>) {
        self.state.borrow_mut().engine.set_images(images);
    }

    pub fn zoom_in(&self) {
        self.update_zoom(ZoomLevel::zoom_in);
    }

    pub fn zoom_out(&self) {
        self.update_zoom(ZoomLevel::zoom_out);
    }

    fn update_zoom(&self, step: impl Fn(ZoomLevel) -> ZoomLevel) {
        let mut state = self.state.borrow_mut();
        let zoom = step(state.zoom);
        if zoom == state.zoom {
            return;
        }
        state.zoom = zoom;
        state.engine.set_zoom(zoom);

        let config = state.engine.config().clone();
        let prefs = GridPreferences {
            zoom,
            spacing: config.layout.spacing,
            lod: config.lod,
        };
        state.prefs.save(&state.prefs_key, prefs);
    }

    /// Detaches the engine from its source and frees every overlay surface.
    pub fn unmount(&self) {
        let mut state = self.state.borrow_mut();
        state.engine.unmount();
        state.overlays.clear();
    }

    fn on_frame(&self) {
        let total = {
            let mut state = self.state.borrow_mut();
            state.engine.on_frame();
            state.sync_overlays();
            state.engine.total_height()
        };
        self.area.set_content_height(total.ceil() as i32);
        self.area.queue_draw();
    }

    fn setup_scroll(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        self.scrolled.vadjustment().connect_value_changed(move |adj| {
            if let Some(view) = weak.upgrade() {
                let mut state = view.state.borrow_mut();
                state.engine.set_scroll_offset(adj.value() as f32);
                state.sync_overlays();
                drop(state);
                view.area.queue_draw();
            }
        });
    }

    fn setup_resize_observer(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.scrolled.add_tick_callback(move |widget, _clock| {
            if let Some(view) = weak.upgrade() {
                let (width, height) = (widget.width(), widget.height());
                if width > 0 && height > 0 {
                    let mut state = view.state.borrow_mut();
                    let effect = state.engine.set_container_size(width as f32, height as f32);
                    if effect == ResizeEffect::ViewportOnly {
                        state.sync_overlays();
                        drop(state);
                        view.area.queue_draw();
                    }
                }
            }
            glib::ControlFlow::Continue
        });
    }

    fn setup_draw(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.area.set_draw_func(move |_area, cr, _w, _h| {
            if let Some(view) = weak.upgrade() {
                view.draw(cr);
            }
        });
    }

    /// Paints the current window. Overlay pixels were read back by
    /// [`GridState::sync_overlays`]; nothing here waits on the GPU.
    fn draw(&self, cr: &cairo::Context) {
        let state = self.state.borrow();
        for cell in state.engine.visible_cells() {
            paint_placeholder(cr, &cell);
            let painted = state
                .overlays
                .get(&cell.image_id)
                .and_then(|overlay| overlay.painted.as_ref());
            if let Some(surface) = painted {
                if cr.set_source_surface(surface, cell.x as f64, cell.y as f64).is_ok() {
                    let _ = cr.paint();
                }
            }
        }
    }
}

impl GridState {
    /// Renders overlays for the visible cells and copies their pixels for
    /// cairo. Runs from the frame and scroll callbacks, outside drawing.
    fn sync_overlays(&mut self) {
        let cells = self.engine.visible_cells();
        let lod = self.engine.lod_settings();

        let mut live = HashMap::with_capacity(cells.len());
        for cell in &cells {
            let Some(image) = self.engine.images().get(cell.image_index).cloned() else {
                continue;
            };
            if image.boxes().is_empty() {
                continue;
            }

            let mut overlay = self.overlays.remove(&cell.image_id).unwrap_or_else(|| CellOverlay {
                renderer: LodOverlayRenderer::new(Rc::clone(&self.factory), lod),
                painted: None,
            });
            overlay.renderer.set_settings(lod);

            match overlay.renderer.render(image.boxes(), cell.width, cell.height) {
                RenderOutcome::Drawn { .. } => {
                    overlay.painted = overlay
                        .renderer
                        .surface()
                        .and_then(|s| s.read_pixels().ok())
                        .and_then(|pixels| to_cairo_surface(&pixels));
                }
                RenderOutcome::Unchanged => {}
                RenderOutcome::Released | RenderOutcome::Unavailable => overlay.painted = None,
            }
            live.insert(cell.image_id, overlay);
        }

        // Whatever is left scrolled out of view.
        self.overlays = live;
    }
}

fn paint_placeholder(cr: &cairo::Context, cell: &VisibleCell) {
    let shade = 0.18 + (cell.image_id.0 % 7) as f64 * 0.02;
    cr.set_source_rgb(shade, shade, shade + 0.03);
    cr.rectangle(
        cell.x as f64,
        cell.y as f64,
        cell.width as f64,
        cell.height as f64,
    );
    if let Err(e) = cr.fill() {
        warn!("Failed to paint cell {}: {}", cell.image_id, e);
    }
}

/// RGBA (straight alpha) to cairo's premultiplied native-endian ARGB32.
fn to_cairo_surface(pixels: &RgbaImage) -> Option<cairo::ImageSurface> {
    let (w, h) = pixels.dimensions();
    let mut data = Vec::with_capacity((w * h * 4) as usize);
    for p in pixels.pixels() {
        let [r, g, b, a] = p.0;
        let premul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        let argb = u32::from_be_bytes([a, premul(r), premul(g), premul(b)]);
        data.extend_from_slice(&argb.to_ne_bytes());
    }
    cairo::ImageSurface::create_for_data(data, cairo::Format::ARgb32, w as i32, h as i32, (w * 4) as i32)
        .map_err(|e| warn!("Failed to wrap overlay pixels: {}", e))
        .ok()
}
