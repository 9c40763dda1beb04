pub mod action;
pub mod agent;
pub mod belief;
pub mod block;
pub mod brain;
pub mod config;
pub mod grid;
pub mod inventory;
pub mod map;
pub mod motion;
pub mod observation;
pub mod protocol;
pub mod replay;
pub mod stats;
pub mod strategy;
