use autoscan_3d::ops::descriptor_distance;

use super::Correspondence;

/// Pair every source descriptor with its `k` nearest target descriptors in L2 distance.
///
/// Equal distances keep the lower target index first. Descriptors of zero length never
/// match.
pub fn match_descriptors(source: &[Vec<f32>], target: &[Vec<f32>], k: usize) -> Vec<Correspondence> {
    let mut correspondences = Vec::with_capacity(source.len().saturating_mul(k.min(target.len())));
    for (source_index, descriptor) in source.iter().enumerate() {
        if descriptor.is_empty() {
            continue;
        }
        let mut candidates = target
            .iter()
            .enumerate()
            .filter(|(_, other)| other.len() == descriptor.len())
            .map(|(target_index, other)| (target_index, descriptor_distance(descriptor, other)))
            .filter(|(_, distance)| distance.is_finite())
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        correspondences.extend(candidates.into_iter().take(k).map(|(target_index, distance)| {
            Correspondence {
                source_index,
                target_index,
                distance,
            }
        }));
    }
    correspondences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_descriptor_wins() {
        let source = vec![vec![0.0, 0.0], vec![10.0, 10.0]];
        let target = vec![vec![9.0, 10.0], vec![0.5, 0.0], vec![0.0, 3.0]];
        let matches = match_descriptors(&source, &target, 1);
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].source_index, matches[0].target_index), (0, 1));
        assert_eq!((matches[1].source_index, matches[1].target_index), (1, 0));
        assert_eq!(matches[0].distance, 0.5);
    }

    #[test]
    fn test_k_matches_sorted() {
        let source = vec![vec![0.0]];
        let target = vec![vec![3.0], vec![1.0], vec![2.0]];
        let matches = match_descriptors(&source, &target, 2);
        let targets = matches.iter().map(|m| m.target_index).collect::<Vec<_>>();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn test_no_targets() {
        assert!(match_descriptors(&[vec![1.0]], &[], 3).is_empty());
    }

    #[test]
    fn test_huge_k_takes_every_target() {
        let matches = match_descriptors(&[vec![1.0], vec![2.0]], &[vec![1.0]], usize::MAX / 2 + 1);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].distance, 1.0);
    }
}
