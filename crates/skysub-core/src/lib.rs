pub mod error;
pub mod consts;
pub mod frame;
pub mod stats;
pub mod config;
pub mod io;
pub mod select;
pub mod cube;
pub mod subtract;
pub mod background;
pub mod destripe;
pub mod pipeline;
