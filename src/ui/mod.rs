pub mod frame_clock;
pub mod grid_view;

pub use frame_clock::GlibFrameScheduler;
pub use grid_view::GridView;
