//! Gamification progression engine for the EnviRon sustainability app: challenge progress,
//! badges, points and levels, plus the community feed, referrals and recommendations that feed
//! into them.

pub mod api;
pub mod constants;
pub mod db;
pub mod engine;
pub mod realtime;
pub mod services;
pub mod util;
