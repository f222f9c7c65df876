pub mod annotate;
pub mod colormap;
pub mod depth;
pub mod segmentation;
pub mod volume;
