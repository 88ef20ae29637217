// Unit tests for wgadm
// These tests work with the public API without modifying the main codebase

#[cfg(test)]
mod registry_tests {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use wgadm::api::Group;
    use wgadm::modal::{ModalHost, ModalName, ModalPhase, ModalRegistry, kinds};

    fn staff() -> Group {
        Group { name: "staff".into(), members: vec!["alice".into()], is_admin: false }
    }

    #[test]
    fn open_before_mount_is_dropped() {
        let registry = ModalRegistry::default();
        assert_eq!(registry.open::<kinds::EditGroupMembers>(staff()), 0);

        let host = ModalHost::<kinds::EditGroupMembers>::mount(&registry);
        // The earlier request is not replayed to the late subscriber.
        assert_eq!(host.phase(), ModalPhase::Closed);
        assert!(host.take_opened().is_none());

        assert_eq!(registry.open::<kinds::EditGroupMembers>(staff()), 1);
        assert_eq!(host.phase(), ModalPhase::Open);
        assert_eq!(host.take_opened().map(|g| g.name), Some("staff".to_string()));
        assert!(host.take_opened().is_none());
    }

    #[test]
    fn close_without_open_is_a_no_op() {
        let registry = ModalRegistry::default();
        let closed = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&closed);
        let mut host = ModalHost::<kinds::AddGroup>::mount(&registry).with_after_close(move |_| *sink.lock() += 1);

        assert_eq!(registry.close(ModalName::AddGroup), 1);
        assert_eq!(host.phase(), ModalPhase::Closed);
        assert!(!host.finish_transition());
        assert_eq!(*closed.lock(), 0);
    }

    #[test]
    fn close_runs_cleanup_once_after_transition() {
        let registry = ModalRegistry::default();
        let closed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&closed);
        let mut host = ModalHost::<kinds::EditGroupMembers>::mount(&registry)
            .with_after_close(move |g: Group| sink.lock().push(g.name));

        registry.open::<kinds::EditGroupMembers>(staff());
        registry.close_modal::<kinds::EditGroupMembers>();
        assert_eq!(host.phase(), ModalPhase::Closing);
        // Payload stays readable while the closing frame is drawn.
        assert_eq!(host.payload().map(|g| g.name), Some("staff".to_string()));

        assert!(host.finish_transition());
        assert!(!host.finish_transition());
        assert_eq!(host.phase(), ModalPhase::Closed);
        assert_eq!(*closed.lock(), vec!["staff".to_string()]);
    }

    #[test]
    fn dropping_host_unsubscribes() {
        let registry = ModalRegistry::default();
        let host = ModalHost::<kinds::AddUser>::mount(&registry);
        assert_eq!(registry.subscriber_count(ModalName::AddUser), (1, 1));
        drop(host);
        assert_eq!(registry.subscriber_count(ModalName::AddUser), (0, 0));
        assert_eq!(registry.open_empty::<kinds::AddUser>(), 0);
    }

    #[test]
    fn every_modal_has_a_distinct_name() {
        let mut names: Vec<&str> = ModalName::ALL.iter().map(|n| n.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ModalName::ALL.len());
    }
}

#[cfg(test)]
mod config_tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use wgadm::app::Theme;
    use wgadm::app::config::ConsoleConfig;

    fn temp_file(name: &str) -> PathBuf {
        let nonce = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("wgadm_{}_{}_{name}", std::process::id(), nonce))
    }

    #[test]
    fn theme_roundtrip_and_init() {
        let path = temp_file("theme.conf");
        let t = Theme::mocha();
        t.write_file(&path).expect("write theme");
        let t2 = Theme::from_file(&path).expect("read theme");
        assert_eq!(format!("{:?}", t.text), format!("{:?}", t2.text));
        assert_eq!(format!("{:?}", t.error), format!("{:?}", t2.error));
        assert_eq!(format!("{:?}", t.header_bg), format!("{:?}", t2.header_bg));

        let init = temp_file("theme_init.conf");
        let _ = std::fs::remove_file(&init);
        let _created = Theme::load_or_init(&init);
        assert!(init.exists());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&init);
    }

    #[test]
    fn console_config_overrides_defaults() {
        let path = temp_file("console.conf");
        std::fs::write(&path, "search_debounce_ms = 50\nshow_keybinds = yes\nunknown = 1\n").unwrap();
        let cfg = ConsoleConfig::from_file(&path).unwrap();
        assert_eq!(cfg.search_debounce_ms, 50);
        assert!(cfg.show_keybinds);
        assert_eq!(cfg.rows_per_page, ConsoleConfig::default().rows_per_page);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn console_config_rejects_bad_network() {
        let path = temp_file("console_bad.conf");
        std::fs::write(&path, "default_network = 10.0.0.0/33\n").unwrap();
        assert!(ConsoleConfig::from_file(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}

#[cfg(test)]
mod search_tests {
    use wgadm::api::Location;
    use wgadm::search::filter_locations;

    fn location(id: u64, name: &str, network: &str) -> Location {
        Location {
            id,
            name: name.into(),
            endpoint: format!("{}.example.com", name.to_lowercase().replace(' ', "")),
            port: 51820,
            network: network.into(),
            allowed_ips: network.into(),
            location_mfa_mode: Default::default(),
            service_location_mode: Default::default(),
            keepalive_interval: 25,
        }
    }

    #[test]
    fn locations_sort_ignoring_case_and_spaces() {
        let all = vec![location(1, "b Site", "10.1.0.0/24"), location(2, "A site", "10.2.0.0/24"), location(3, "aSite 2", "10.3.0.0/24")];
        let names: Vec<String> = filter_locations(&all, "").into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["A site", "aSite 2", "b Site"]);
    }

    #[test]
    fn locations_match_network() {
        let all = vec![location(1, "Office", "10.1.0.0/24"), location(2, "Lab", "10.2.0.0/24")];
        let found = filter_locations(&all, "10.2.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Lab");
    }
}
