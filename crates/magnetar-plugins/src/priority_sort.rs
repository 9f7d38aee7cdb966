use magnetar_core::{Pod, PodRef};
use magnetar_framework::{Plugin, QueueSortPlugin};

/// Queue-sort plugin ordering pods by priority, then age, then name.
///
/// Higher `spec.priority` schedules first; among equals, the older pod
/// wins; names break the final tie so the ordering is total.
pub struct PrioritySort;

impl PrioritySort {
    pub const NAME: &'static str = "PrioritySort";

    fn priority(pod: &Pod) -> i32 {
        pod.spec.as_ref().and_then(|s| s.priority).unwrap_or(0)
    }
}

impl Plugin for PrioritySort {
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl QueueSortPlugin for PrioritySort {
    fn less(&self, a: &Pod, b: &Pod) -> bool {
        let priority_a = Self::priority(a);
        let priority_b = Self::priority(b);
        if priority_a != priority_b {
            return priority_a > priority_b;
        }

        let created_a = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
        let created_b = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
        // A pod without a creation timestamp sorts last
        match (created_a, created_b) {
            (Some(x), Some(y)) if x != y => return x < y,
            (Some(_), None) => return true,
            (None, Some(_)) => return false,
            _ => {}
        }

        PodRef::from_pod(a).to_string() < PodRef::from_pod(b).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn create_test_pod(name: &str, priority: Option<i32>, created_secs: Option<i64>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.namespace = Some("default".to_string());
        pod.metadata.name = Some(name.to_string());
        pod.metadata.creation_timestamp = created_secs.map(|secs| {
            Time(
                k8s_openapi::chrono::DateTime::from_timestamp(secs, 0)
                    .unwrap_or_default(),
            )
        });
        if priority.is_some() {
            pod.spec = Some(k8s_openapi::api::core::v1::PodSpec {
                priority,
                ..Default::default()
            });
        }
        pod
    }

    #[test]
    fn test_higher_priority_first() {
        let high = create_test_pod("high", Some(100), Some(2000));
        let low = create_test_pod("low", Some(1), Some(1000));

        assert!(PrioritySort.less(&high, &low));
        assert!(!PrioritySort.less(&low, &high));
    }

    #[test]
    fn test_equal_priority_older_first() {
        let old = create_test_pod("old", Some(10), Some(1000));
        let new = create_test_pod("new", Some(10), Some(2000));

        assert!(PrioritySort.less(&old, &new));
        assert!(!PrioritySort.less(&new, &old));
    }

    #[test]
    fn test_name_breaks_final_tie() {
        let a = create_test_pod("aaa", None, Some(1000));
        let b = create_test_pod("bbb", None, Some(1000));

        assert!(PrioritySort.less(&a, &b));
        assert!(!PrioritySort.less(&b, &a));
    }
}
