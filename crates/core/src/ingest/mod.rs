pub mod adapter;
pub mod alpha_vantage;
pub mod normalize;
pub mod nse;
pub mod provider;
pub mod twelve_data;
pub mod types;
pub mod yahoo;
