// Dirty region defaults
pub fn default_dirty_padding() -> f32 {
    2.0
}

pub fn default_dirty_min_area() -> f32 {
    1.0
}

pub fn default_merge_threshold() -> f32 {
    20.0
}

pub fn default_max_dirty_rects() -> usize {
    16
}

/// Dirty area / surface area above which a full redraw is cheaper.
pub fn default_full_redraw_ratio() -> f32 {
    0.6
}

// Entry cache defaults
pub fn default_cache_max_entries() -> usize {
    256
}

pub fn default_cache_max_bytes() -> usize {
    64 * 1024 * 1024
}

/// `None` disables expiry.
pub fn default_cache_ttl_ms() -> Option<u64> {
    Some(120_000)
}

pub fn default_cache_sweep_interval_ms() -> u64 {
    5_000
}

pub fn default_recency_weight() -> f32 {
    1.0
}

pub fn default_complexity_weight() -> f32 {
    1.0
}

// Object / scene cache defaults
pub fn default_object_cache_threshold() -> f32 {
    50.0
}

pub fn default_scene_threshold() -> usize {
    100
}

// Memory sampling defaults
pub fn default_memory_pressure_ratio() -> f32 {
    0.85
}

pub fn default_memory_headroom_ratio() -> f32 {
    0.7
}

pub fn default_memory_sample_interval_ms() -> u64 {
    1_000
}

// Prewarm default
pub fn default_prewarm_max_count() -> usize {
    32
}
