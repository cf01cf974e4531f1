//! End-to-end scenarios from the configuration specification (cascaded
//! reads, reset propagation, and an XML save/load round trip).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata::config::{CascadingConfiguration, ChangeKind, DefaultConfiguration, InlineContext};
use strata::persistence::XmlPersistenceStrategy;

#[test]
fn cascaded_read_resolves_nearest_own_value() {
    let base = DefaultConfiguration::new(None);
    let x = base.add_item::<i64>("/a/b/x", 7).unwrap();
    x.set_comment(Some(vec!["hello".to_string()])).unwrap();

    let mid = CascadingConfiguration::new(base.root(), None);
    let mid_x = mid.get_item::<i64>("/a/b/x").unwrap();
    mid_x.set_value(9).unwrap();

    let top = CascadingConfiguration::new(mid.root(), None);
    let top_x = top.get_item::<i64>("/a/b/x").unwrap();

    assert_eq!(top_x.value(), 9);
    assert_eq!(mid_x.value(), 9);
    assert_eq!(x.value(), 7);
    assert_eq!(top_x.comment(), Some(vec!["hello".to_string()]));
}

#[test]
fn reset_propagates_exactly_one_notification_to_uninvolved_descendants() {
    let base = DefaultConfiguration::new(None);
    let x = base.add_item::<i64>("/a/b/x", 7).unwrap();

    let mid = CascadingConfiguration::new(base.root(), None);
    let mid_x = mid.get_item::<i64>("/a/b/x").unwrap();
    mid_x.set_value(9).unwrap();

    let top = CascadingConfiguration::new(mid.root(), None);
    let top_x = top.get_item::<i64>("/a/b/x").unwrap();
    assert_eq!(top_x.value(), 9);

    let observed = Arc::new(AtomicUsize::new(0));
    let observed_clone = observed.clone();
    top_x.subscribe(Arc::new(InlineContext), move |kind| {
        if kind == ChangeKind::Value {
            observed_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    mid_x.reset_value();

    assert_eq!(top_x.value(), 7);
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    let _ = x;
}

#[test]
fn xml_round_trip_preserves_values_and_comments() {
    let dir = tempfile::tempdir().unwrap();
    let strategy: Arc<dyn strata::persistence::PersistenceStrategy> =
        Arc::new(XmlPersistenceStrategy::new(dir.path().join("config.xml")));

    {
        let base = DefaultConfiguration::new(Some(strategy.clone()));
        let a = base.add_item::<String>("/a", "\u{03c0}".to_string()).unwrap();
        a.set_comment(Some(vec!["line1".to_string(), "line2".to_string()])).unwrap();
        base.add_item::<Vec<i64>>("/a/b", vec![1, 2, 3]).unwrap();
        base.save(Default::default()).unwrap();
        assert!(!base.root().is_modified());
    }

    {
        let base = DefaultConfiguration::new(Some(strategy.clone()));
        let a = base.add_item::<String>("/a", String::new()).unwrap();
        let b = base.add_item::<Vec<i64>>("/a/b", Vec::new()).unwrap();
        base.load().unwrap();

        assert_eq!(a.value(), "\u{03c0}");
        assert_eq!(a.comment(), Some(vec!["line1".to_string(), "line2".to_string()]));
        assert_eq!(b.value(), vec![1, 2, 3]);
        assert!(!base.root().is_modified());
    }

    let xml = std::fs::read_to_string(dir.path().join("config.xml")).unwrap();
    assert!(xml.contains("<ConfigurationFile>"));
    assert!(xml.contains(r#"<Item name="a">"#));
    assert!(xml.contains("<!--line1-->"));
    assert!(xml.contains("<!--line2-->"));
    let item_pos = xml.find(r#"<Item name="a">"#).unwrap();
    assert!(xml.find("<!--line1-->").unwrap() < item_pos);
    assert!(xml.find("<!--line2-->").unwrap() < item_pos);
}

#[test]
fn add_item_twice_at_same_path_fails() {
    let base = DefaultConfiguration::new(None);
    base.add_item::<i64>("/x", 1).unwrap();
    assert!(base.add_item::<i64>("/x", 2).is_err());
}

#[test]
fn get_item_on_unknown_path_is_not_found() {
    let base = DefaultConfiguration::new(None);
    assert!(base.root().try_get_value::<i64>("/nope", true).unwrap().is_none());
}

#[test]
fn try_get_value_without_inherit_only_sees_this_layers_own_value() {
    let base = DefaultConfiguration::new(None);
    base.add_item::<i64>("/a", 7).unwrap();
    let mid = CascadingConfiguration::new(base.root(), None);

    assert_eq!(mid.root().try_get_value::<i64>("/a", false).unwrap(), None);
    assert_eq!(mid.root().try_get_value::<i64>("/a", true).unwrap(), Some(7));

    mid.get_item::<i64>("/a").unwrap().set_value(9).unwrap();
    assert_eq!(mid.root().try_get_value::<i64>("/a", false).unwrap(), Some(9));
}

#[test]
fn add_inheriting_layer_from_a_non_root_node_mirrors_the_whole_cascade() {
    let base = DefaultConfiguration::new(None);
    base.add_item::<i64>("/a/b/x", 7).unwrap();
    base.add_item::<i64>("/a/c", 3).unwrap();

    let b_node = base.root().get_child("a").unwrap().get_child("b").unwrap();
    let mid_b = b_node.add_inheriting_layer(None);

    assert_eq!(mid_b.path(), "/a/b");
    assert_eq!(mid_b.try_get_value::<i64>("x", true).unwrap(), Some(7));

    let mid_root = mid_b.parent().unwrap().parent().unwrap();
    assert_eq!(mid_root.path(), "/");
    assert_eq!(mid_root.try_get_value::<i64>("/a/c", true).unwrap(), Some(3));
}
