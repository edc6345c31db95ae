//! Local account pages: login form, logout and provider-side error pages

pub mod html;
pub mod login;
