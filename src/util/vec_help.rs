use std::cmp::Ordering;

/// Remove every element which appears twice in a row. On a sorted vector in
/// which no element appears more than twice this leaves the elements of odd
/// multiplicity.
pub(crate) fn remove_doubles<T: Eq + Copy>(v: &mut Vec<T>) {
    let mut ii = 0;
    let mut jj = 0;
    while jj + 1 < v.len() {
        if v[jj] == v[jj + 1] {
            jj += 2;
        } else {
            v[ii] = v[jj];
            ii += 1;
            jj += 1;
        }
    }
    if jj < v.len() {
        v[ii] = v[jj];
        ii += 1;
    }
    v.truncate(ii);
}

/// Symmetric difference of two sorted sets, returned sorted.
pub(crate) fn symmetric_difference<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut v = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                v.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                v.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                v.push(a[i]);
                v.push(b[j]);
                i += 1;
                j += 1;
            }
        }
    }
    v.extend_from_slice(&a[i..]);
    v.extend_from_slice(&b[j..]);
    remove_doubles(&mut v);
    v
}

/// Number of common elements of two sorted sets.
pub(crate) fn intersection_count<T: Ord>(a: &[T], b: &[T]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

/// Assumes the slice is sorted.
pub(crate) fn has_repeats<T: Eq>(v: &[T]) -> bool {
    v.windows(2).any(|w| w[0] == w[1])
}
