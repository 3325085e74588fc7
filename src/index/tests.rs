use super::*;

fn line_index() -> VectorIndex {
    // Points on the x axis at 0, 1, 2, 3, 4
    VectorIndex::build((0..5).map(|i| vec![i as f32, 0.0]).collect())
        .expect("build should succeed")
}

#[test]
fn build_reports_shape() {
    let index = line_index();
    assert_eq!(index.len(), 5);
    assert_eq!(index.dimension(), 2);
    assert!(!index.is_empty());
}

#[test]
fn build_rejects_empty_input() {
    assert!(matches!(
        VectorIndex::build(Vec::new()),
        Err(DocsError::Index(_))
    ));
    assert!(matches!(
        VectorIndex::build(vec![Vec::new(), Vec::new()]),
        Err(DocsError::Index(_))
    ));
}

#[test]
fn build_rejects_mismatched_dimensions() {
    let result = VectorIndex::build(vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0]]);
    assert!(matches!(
        result,
        Err(DocsError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn build_rejects_non_finite_values() {
    let result = VectorIndex::build(vec![vec![0.0], vec![-f32::NAN], vec![1.0]]);
    assert!(matches!(result, Err(DocsError::Index(ref message)) if message.contains("Embedding 1")));

    assert!(matches!(
        VectorIndex::build(vec![vec![0.0, f32::INFINITY]]),
        Err(DocsError::Index(_))
    ));
}

#[test]
fn search_rejects_non_finite_query() {
    let index = line_index();
    assert!(matches!(
        index.search(&[f32::NAN, 0.0], 3),
        Err(DocsError::Index(_))
    ));
    assert!(matches!(
        index.search(&[0.0, f32::NEG_INFINITY], 3),
        Err(DocsError::Index(_))
    ));
}

#[test]
fn search_orders_by_distance() {
    let index = line_index();

    let neighbors = index.search(&[3.2, 0.0], 3).expect("search should succeed");
    let positions = neighbors.iter().map(|n| n.position).collect::<Vec<_>>();

    assert_eq!(positions, vec![3, 4, 2]);
    assert!((neighbors[0].distance - 0.04).abs() < 1e-5);
    assert!(
        neighbors
            .windows(2)
            .all(|pair| pair[0].distance <= pair[1].distance)
    );
}

#[test]
fn distance_is_squared() {
    let index = VectorIndex::build(vec![vec![0.0, 0.0]]).expect("build should succeed");
    let neighbors = index.search(&[3.0, 4.0], 1).expect("search should succeed");
    assert_eq!(neighbors[0].distance, 25.0);
}

#[test]
fn k_larger_than_len_is_clamped() {
    let index = line_index();
    let neighbors = index.search(&[0.0, 0.0], 50).expect("search should succeed");
    assert_eq!(neighbors.len(), 5);
    assert_eq!(
        neighbors.iter().map(|n| n.position).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

#[test]
fn k_results_returned_exactly() {
    let index = line_index();
    for k in 1..=5 {
        assert_eq!(
            index
                .search(&[2.0, 1.0], k)
                .expect("search should succeed")
                .len(),
            k
        );
    }
}

#[test]
fn zero_k_is_rejected() {
    let index = line_index();
    assert!(matches!(
        index.search(&[0.0, 0.0], 0),
        Err(DocsError::InvalidResultCount(0))
    ));
}

#[test]
fn ties_break_by_insertion_position() {
    let index = VectorIndex::build(vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
        vec![5.0, 5.0],
    ])
    .expect("build should succeed");

    let all = index.search(&[0.0, 0.0], 5).expect("search should succeed");
    assert_eq!(
        all.iter().map(|n| n.position).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );

    // Partial selection must keep the lowest positions among equal distances
    let two = index.search(&[0.0, 0.0], 2).expect("search should succeed");
    assert_eq!(
        two.iter().map(|n| n.position).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn duplicate_vectors_tie_on_lowest_position() {
    let index = VectorIndex::build(vec![vec![9.0], vec![1.0], vec![1.0], vec![1.0]])
        .expect("build should succeed");

    let neighbors = index.search(&[1.0], 1).expect("search should succeed");
    assert_eq!(
        neighbors,
        vec![Neighbor {
            position: 1,
            distance: 0.0
        }]
    );
}

#[test]
fn identical_query_is_distance_zero() {
    let embeddings = vec![
        vec![0.3, -1.2, 4.0],
        vec![2.5, 0.0, 1.0],
        vec![-0.7, 0.7, 0.7],
    ];
    let index = VectorIndex::build(embeddings.clone()).expect("build should succeed");

    for (position, embedding) in embeddings.iter().enumerate() {
        let neighbors = index.search(embedding, 1).expect("search should succeed");
        assert_eq!(neighbors[0].position, position);
        assert_eq!(neighbors[0].distance, 0.0);
    }
}

#[test]
fn query_dimension_must_match() {
    let index = line_index();
    assert!(matches!(
        index.search(&[1.0, 2.0, 3.0], 1),
        Err(DocsError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(matches!(
        index.search(&[], 1),
        Err(DocsError::DimensionMismatch {
            expected: 2,
            actual: 0
        })
    ));
}
