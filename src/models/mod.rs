//! Machine learning models
//!
//! Base learners (CART trees, random forest, linear and logistic regression,
//! k-means, DBSCAN) plus the three task heads built on top of them:
//! clustering with semantic labels, churn classification and CLV regression.

pub mod churn;
pub mod clustering;
pub mod clv;
mod dbscan;
pub mod decision_tree;
mod kmeans;
mod linear;
mod logistic;
mod random_forest;

pub use churn::{risk_bucket, ChurnClassifier, ChurnPrediction, ChurnTrainingReport};
pub use clustering::{
    silhouette, ClusterAssignment, ClusterProfile, ClusterQuality, ClusteringModel, KSweep,
};
pub use clv::{ClvPrediction, ClvRegressor, ClvTrainingReport, ParetoSummary};
pub use dbscan::{Dbscan, DbscanConfig, NOISE};
pub use decision_tree::{DecisionTree, TaskType, TreeConfig, TreeNode};
pub use kmeans::{KMeans, KMeansConfig};
pub use linear::LinearRegression;
pub use logistic::LogisticRegression;
pub use random_forest::{ForestConfig, RandomForest};
