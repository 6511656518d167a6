/// Cosine similarity. Zero when either vector has zero norm; vectors of
/// different lengths are compared over their common prefix.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON || !denom.is_finite() {
        return 0.0;
    }
    let sim = dot / denom;
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}
