use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use gtk4::prelude::*;
use gtk4::{gio, Application, ApplicationWindow, EventControllerKey};
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::PreferenceStore;
use crate::feed::{DirectoryFeed, SyntheticFeed};
use crate::overlay;
use crate::ui::GridView;

const APP_ID: &str = "io.github.justified_grid.Viewer";
const PAGE_SIZE: usize = 200;
const DEMO_IMAGES: usize = 5_000;
const DEMO_BOXES: usize = 12;
const DEMO_LATENCY: Duration = Duration::from_millis(120);

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")
    })
}

pub struct GridApp {
    app: Application,
}

impl GridApp {
    pub fn new() -> Self {
        let app = Application::builder()
            .application_id(APP_ID)
            .flags(gio::ApplicationFlags::HANDLES_OPEN)
            .build();

        let prefs = Rc::new(PreferenceStore::new());
        let activate_prefs = Rc::clone(&prefs);
        app.connect_activate(move |app| Self::present(app, None, &activate_prefs));
        app.connect_open(move |app, files, _hint| {
            let path = files.first().and_then(|f| f.path());
            Self::present(app, path, &prefs);
        });

        Self { app }
    }

    pub fn run(&self) -> i32 {
        self.app.run().into()
    }

    fn present(app: &Application, path: Option<PathBuf>, prefs: &Rc<PreferenceStore>) {
        let key = path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "demo".to_string());
        let grid = GridView::new(&key, Rc::clone(prefs), overlay::default_factory(true));

        let connected = match path.as_deref() {
            Some(dir) => Self::connect_directory(&grid, dir),
            None => Self::connect_demo(&grid),
        };
        if let Err(e) = connected {
            warn!("Failed to open collection: {:#}", e);
        }

        let window = ApplicationWindow::builder()
            .application(app)
            .title(format!("jgrid - {key}"))
            .default_width(1280)
            .default_height(800)
            .child(grid.widget())
            .build();

        let keys = EventControllerKey::new();
        let key_grid = Rc::clone(&grid);
        keys.connect_key_pressed(move |_, key, _, _| match key {
            gdk4::Key::plus | gdk4::Key::equal | gdk4::Key::KP_Add => {
                key_grid.zoom_in();
                glib::Propagation::Stop
            }
            gdk4::Key::minus | gdk4::Key::KP_Subtract => {
                key_grid.zoom_out();
                glib::Propagation::Stop
            }
            _ => glib::Propagation::Proceed,
        });
        window.add_controller(keys);

        window.connect_close_request(move |_| {
            grid.unmount();
            glib::Propagation::Proceed
        });
        window.present();
        info!(collection = %key, "Grid window opened");
    }

    fn connect_directory(grid: &Rc<GridView>, dir: &Path) -> Result<()> {
        let (tx, rx) = grid.page_channel();
        let feed = DirectoryFeed::new(dir, PAGE_SIZE, runtime()?.handle().clone(), tx)
            .with_context(|| format!("Cannot browse {}", dir.display()))?;
        grid.attach_source(Box::new(feed), rx);
        Ok(())
    }

    fn connect_demo(grid: &Rc<GridView>) -> Result<()> {
        let (tx, rx) = grid.page_channel();
        let feed = SyntheticFeed::new(DEMO_IMAGES, PAGE_SIZE, tx)
            .context("Failed to create demo feed")?
            .with_boxes(DEMO_BOXES);
        let feed = Rc::new(RefCell::new(feed));
        grid.attach_source(Box::new(Rc::clone(&feed)), rx);

        // Synthetic fetches resolve on a timer, like a slow network would.
        let weak = Rc::downgrade(&feed);
        glib::timeout_add_local(DEMO_LATENCY, move || {
            let Some(feed) = weak.upgrade() else {
                return glib::ControlFlow::Break;
            };
            feed.borrow_mut().complete_pending();
            glib::ControlFlow::Continue
        });
        Ok(())
    }
}

impl Default for GridApp {
    fn default() -> Self {
        Self::new()
    }
}
