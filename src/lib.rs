pub mod astro_util;
pub mod constellation;
pub mod image_utils;
pub mod nova_client;
pub mod pattern_match;
pub mod pipeline;
pub mod solver_trait;
pub mod star_detect;
