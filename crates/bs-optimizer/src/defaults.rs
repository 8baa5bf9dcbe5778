//! Non-swept baseline parameters per backend.

use serde::{Deserialize, Serialize};

use bs_types::{BackendKind, ParamSet};

/// Where the backend tool trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

/// Baseline parameter set for `backend` on `device`.
///
/// Thread counts are left at the tools' "all cores" defaults.
pub fn baseline(backend: BackendKind, device: Device) -> ParamSet {
    match backend {
        BackendKind::LightGbm => {
            let params = ParamSet::new()
                .with("objective", "binary")
                .with("boosting", "gbdt")
                .with("learning_rate", 0.1)
                .with("num_leaves", 31i64)
                .with("max_depth", -1i64)
                .with("min_data_in_leaf", 20i64)
                .with("feature_fraction", 1.0)
                .with("bagging_fraction", 1.0)
                .with("bagging_freq", 0i64)
                .with("lambda_l1", 0.0)
                .with("lambda_l2", 0.0)
                .with("max_bin", 255i64)
                .with("num_threads", 0i64)
                .with("seed", 42i64);
            match device {
                Device::Cpu => params.with("device_type", "cpu"),
                Device::Gpu => params.with("device_type", "gpu"),
            }
        }
        BackendKind::XgBoost => {
            let params = ParamSet::new()
                .with("objective", "binary:logistic")
                .with("booster", "gbtree")
                .with("eta", 0.1)
                .with("max_depth", 6i64)
                .with("min_child_weight", 1.0)
                .with("subsample", 1.0)
                .with("colsample_bytree", 1.0)
                .with("lambda", 1.0)
                .with("alpha", 0.0)
                .with("max_bin", 256i64)
                .with("tree_method", "hist")
                .with("seed", 42i64);
            match device {
                Device::Cpu => params.with("device", "cpu"),
                Device::Gpu => params.with("device", "cuda"),
            }
        }
        BackendKind::CatBoost => {
            let params = ParamSet::new()
                .with("loss_function", "Logloss")
                .with("learning_rate", 0.1)
                .with("depth", 6i64)
                .with("l2_leaf_reg", 3.0)
                .with("border_count", 254i64)
                .with("random_seed", 42i64);
            match device {
                Device::Cpu => params.with("task_type", "CPU"),
                Device::Gpu => params.with("task_type", "GPU"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bs_types::ParamValue;

    #[test]
    fn every_backend_has_a_binary_objective() {
        assert_eq!(
            baseline(BackendKind::LightGbm, Device::Cpu).get("objective"),
            Some(&ParamValue::from("binary"))
        );
        assert_eq!(
            baseline(BackendKind::XgBoost, Device::Cpu).get("objective"),
            Some(&ParamValue::from("binary:logistic"))
        );
        assert_eq!(
            baseline(BackendKind::CatBoost, Device::Cpu).get("loss_function"),
            Some(&ParamValue::from("Logloss"))
        );
    }

    #[test]
    fn device_flag_selects_gpu_params() {
        let lgbm = baseline(BackendKind::LightGbm, Device::Gpu);
        assert_eq!(lgbm.get("device_type"), Some(&ParamValue::from("gpu")));
        let xgb = baseline(BackendKind::XgBoost, Device::Gpu);
        assert_eq!(xgb.get("device"), Some(&ParamValue::from("cuda")));
        let cb = baseline(BackendKind::CatBoost, Device::Gpu);
        assert_eq!(cb.get("task_type"), Some(&ParamValue::from("GPU")));
    }

    #[test]
    fn swept_values_overlay_the_baseline() {
        let base = baseline(BackendKind::LightGbm, Device::Cpu);
        let swept = ParamSet::new()
            .with("num_leaves", 512i64)
            .with("extra_trees", true);
        let merged = base.merged(&swept);
        assert_eq!(merged.get("num_leaves"), Some(&ParamValue::Int(512)));
        assert_eq!(merged.len(), base.len() + 1);
        // overwritten keys keep their baseline position
        assert_eq!(
            merged.names().position(|n| n == "num_leaves"),
            base.names().position(|n| n == "num_leaves")
        );
    }
}
