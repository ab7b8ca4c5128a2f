pub mod bkdr_hash;

/// Intersection of two sorted, deduped string vectors via a sorted merge.
pub fn intersect_sorted(arr1: Vec<String>, arr2: Vec<String>) -> Vec<String> {
    let mut result = Vec::with_capacity(arr1.len().min(arr2.len()));
    let mut i = 0;
    let mut j = 0;

    while i < arr1.len() && j < arr2.len() {
        match arr1[i].cmp(&arr2[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(arr1[i].clone());
                i += 1;
                j += 1;
            }
        }
    }

    result
}

/// Sorts and removes duplicates in place.
pub fn sort_dedup(v: &mut Vec<String>) {
    v.sort_unstable();
    v.dedup();
}
