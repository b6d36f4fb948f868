#![forbid(unsafe_code)]


#[cfg(test)]
mod frame_lifecycle;
#[cfg(test)]
mod geometry;
#[cfg(test)]
mod overlay_cache;
#[cfg(test)]
mod viewpoint;
