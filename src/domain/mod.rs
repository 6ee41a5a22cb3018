// Domain layer - Widget configuration, rows and presentation models
pub mod load_state;
pub mod period;
pub mod row;
pub mod visual;
pub mod widget;
