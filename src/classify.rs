//! Clustering/classification experiments over session feature vectors.
//! Deliberately the only module that touches the ML stack; the core
//! pipeline never links it.

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use thiserror::Error;

use crate::{features::FeatureVector, record::Protocol};

const LABEL_TCP: usize = 0;
const LABEL_UDP: usize = 1;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("need at least {needed} labelled sessions, have {have}")]
    TooFewSessions { have: usize, needed: usize },
    #[error("both protocols must be present in the session set")]
    SingleClass,
    #[error("clustering failed: {0}")]
    Clustering(String),
    #[error("training failed: {0}")]
    Training(String),
}

/// Unsupervised split of the sessions into two clusters, scored against
/// the protocol ground truth.
#[derive(Debug)]
pub struct ClusterOutcome {
    pub assignments: Vec<usize>,
    /// Fraction of sessions whose cluster matches their protocol under
    /// the better of the two cluster-to-protocol pairings.
    pub agreement: f64,
}

/// Supervised evaluation on a held-out split. `confusion[t][p]` counts
/// sessions of true class `t` predicted as `p` (0 = TCP, 1 = UDP).
#[derive(Debug)]
pub struct Evaluation {
    pub accuracy: f32,
    pub confusion: [[usize; 2]; 2],
    pub train_size: usize,
    pub test_size: usize,
}

fn label_of(feature: &FeatureVector) -> usize {
    match feature.label {
        Protocol::Udp => LABEL_UDP,
        _ => LABEL_TCP,
    }
}

fn matrix_of(features: &[FeatureVector]) -> Array2<f64> {
    let mut matrix = Array2::zeros((features.len(), FeatureVector::DIM));
    for (row, feature) in features.iter().enumerate() {
        for (column, value) in feature.values().into_iter().enumerate() {
            matrix[[row, column]] = value;
        }
    }
    matrix
}

/// Column-wise standardization so byte counts do not drown the timing
/// features.
fn standardize(mut matrix: Array2<f64>) -> Array2<f64> {
    for mut column in matrix.axis_iter_mut(Axis(1)) {
        let mean = column.mean().unwrap_or(0.0);
        let std = column.std(0.0);
        if std > 0.0 {
            column.mapv_inplace(|value| (value - mean) / std);
        } else {
            column.mapv_inplace(|value| value - mean);
        }
    }
    matrix
}

/// Seeded k-means with k = 2 over standardized features, reporting how
/// well the clusters line up with the TCP/UDP split.
pub fn cluster_by_protocol(
    features: &[FeatureVector],
    seed: u64,
) -> Result<ClusterOutcome, ExperimentError> {
    if features.len() < 2 {
        return Err(ExperimentError::TooFewSessions {
            have: features.len(),
            needed: 2,
        });
    }

    let matrix = standardize(matrix_of(features));
    let dataset = DatasetBase::from(matrix.clone());
    let rng = Xoshiro256Plus::seed_from_u64(seed);
    let model = KMeans::params_with_rng(2, rng)
        .tolerance(1e-3)
        .fit(&dataset)
        .map_err(|e| ExperimentError::Clustering(e.to_string()))?;
    let assignments: Vec<usize> = model.predict(&matrix).to_vec();

    // cluster ids are arbitrary; score both pairings and keep the better
    let matching = assignments
        .iter()
        .zip(features)
        .filter(|(assignment, feature)| **assignment == label_of(feature))
        .count();
    let agreement =
        matching.max(features.len() - matching) as f64 / features.len() as f64;

    Ok(ClusterOutcome {
        assignments,
        agreement,
    })
}

/// Class-balanced deterministic split: every `holdout`-th session of
/// each protocol goes to the test set.
fn split(features: &[FeatureVector], holdout: usize) -> (Vec<&FeatureVector>, Vec<&FeatureVector>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    let mut per_class = [0usize; 2];
    for feature in features {
        let seen = &mut per_class[label_of(feature)];
        if *seen % holdout == 0 {
            test.push(feature);
        } else {
            train.push(feature);
        }
        *seen += 1;
    }
    (train, test)
}

fn dataset_of(features: &[&FeatureVector]) -> DatasetBase<Array2<f64>, Array1<usize>> {
    let owned: Vec<FeatureVector> = features.iter().map(|f| (*f).clone()).collect();
    let records = matrix_of(&owned);
    let targets: Array1<usize> = owned.iter().map(label_of).collect();
    DatasetBase::new(records, targets)
}

/// Train a decision tree on the deterministic split and evaluate it on
/// the held-out sessions.
pub fn train_decision_tree(features: &[FeatureVector]) -> Result<Evaluation, ExperimentError> {
    if features.len() < 8 {
        return Err(ExperimentError::TooFewSessions {
            have: features.len(),
            needed: 8,
        });
    }
    let classes = features.iter().map(label_of).collect::<std::collections::BTreeSet<_>>();
    if classes.len() < 2 {
        return Err(ExperimentError::SingleClass);
    }

    let (train, test) = split(features, 4);
    let train_set = dataset_of(&train);
    let test_set = dataset_of(&test);

    let model = DecisionTree::params()
        .fit(&train_set)
        .map_err(|e| ExperimentError::Training(e.to_string()))?;
    let predicted = model.predict(&test_set);

    let confusion_matrix = predicted
        .confusion_matrix(&test_set)
        .map_err(|e| ExperimentError::Training(e.to_string()))?;

    let mut confusion = [[0usize; 2]; 2];
    for (prediction, feature) in predicted.iter().zip(&test) {
        confusion[label_of(feature)][*prediction] += 1;
    }

    Ok(Evaluation {
        accuracy: confusion_matrix.accuracy(),
        confusion,
        train_size: train.len(),
        test_size: test.len(),
    })
}
