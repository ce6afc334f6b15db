pub mod coingecko;
pub mod pumpportal;
pub mod telegram;
