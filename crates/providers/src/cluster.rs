use crate::Clusterer;

/// Density-based clustering (DBSCAN) over cosine distance.
///
/// Produces variable-size, non-overlapping clusters; points without
/// `min_samples` neighbors within `eps` are noise and do not appear in
/// any cluster.
#[derive(Debug, Clone)]
pub struct DbscanClusterer {
    pub eps: f64,
    pub min_samples: usize,
}

impl DbscanClusterer {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }
}

impl Default for DbscanClusterer {
    fn default() -> Self {
        Self::new(0.3, 2)
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

const UNVISITED: isize = -2;
const NOISE: isize = -1;

impl Clusterer for DbscanClusterer {
    fn cluster(&self, vectors: &[Vec<f32>]) -> Vec<Vec<usize>> {
        let n = vectors.len();
        if n == 0 {
            return Vec::new();
        }

        // Neighborhoods within eps (a point is its own neighbor)
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in 0..n {
                if cosine_distance(&vectors[i], &vectors[j]) <= self.eps {
                    neighbors[i].push(j);
                }
            }
        }

        let mut labels: Vec<isize> = vec![UNVISITED; n];
        let mut next_cluster: isize = 0;

        for point in 0..n {
            if labels[point] != UNVISITED {
                continue;
            }
            if neighbors[point].len() < self.min_samples {
                labels[point] = NOISE;
                continue;
            }

            // Start a new cluster and expand it breadth-first
            let cluster_id = next_cluster;
            next_cluster += 1;
            labels[point] = cluster_id;

            let mut queue: Vec<usize> = neighbors[point].clone();
            let mut head = 0;
            while head < queue.len() {
                let q = queue[head];
                head += 1;

                if labels[q] == NOISE {
                    // Border point reachable from a core point
                    labels[q] = cluster_id;
                }
                if labels[q] != UNVISITED {
                    continue;
                }
                labels[q] = cluster_id;

                if neighbors[q].len() >= self.min_samples {
                    queue.extend(neighbors[q].iter().copied());
                }
            }
        }

        let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); next_cluster as usize];
        for (idx, &label) in labels.iter().enumerate() {
            if label >= 0 {
                clusters[label as usize].push(idx);
            }
        }
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_clusters_and_noise() {
        let clusterer = DbscanClusterer::new(0.1, 2);
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.99, 0.05],
            vec![0.0, 1.0],
            vec![0.05, 0.99],
            vec![-1.0, -1.0], // isolated
        ];
        let clusters = clusterer.cluster(&vectors);

        assert_eq!(clusters.len(), 2);
        let mut sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 2]);
        // the isolated point is in no cluster
        assert!(!clusters.iter().flatten().any(|&i| i == 4));
    }

    #[test]
    fn test_clusters_are_disjoint() {
        let clusterer = DbscanClusterer::new(0.2, 2);
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.95, 0.1],
            vec![0.9, 0.2],
            vec![0.0, 1.0],
        ];
        let clusters = clusterer.cluster(&vectors);
        let total: usize = clusters.iter().map(|c| c.len()).sum();
        let mut all: Vec<usize> = clusters.iter().flatten().copied().collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_empty_input() {
        let clusterer = DbscanClusterer::default();
        assert!(clusterer.cluster(&[]).is_empty());
    }

    #[test]
    fn test_cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]) < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
