/// The `n` entities with the highest counts, descending. Equal counts keep
/// their input order.
pub fn select_top(counts: &[(String, u64)], n: usize) -> Vec<String> {
    let mut ranked: Vec<&(String, u64)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(n).map(|(name, _)| name.clone()).collect()
}
