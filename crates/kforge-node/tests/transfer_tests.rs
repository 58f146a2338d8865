//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Transfer planning against on-disk resource trees."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use kforge_node::transfer::plan;
use kforge_node::{Arch, OsFamily, ResourceLayout, TransferEntry};
use tempfile::tempdir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn dests(entries: &[TransferEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| match entry {
            TransferEntry::Dir(path) => format!("{}/", path),
            TransferEntry::File { dest, .. } => dest.clone(),
        })
        .collect()
}

#[test]
fn merges_matching_architecture_and_drops_foreign_one() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("docker/images");
    write(&src, "install.sh", "#!/bin/bash\n");
    write(&src, "x86_64/pause.tar", "amd");
    write(&src, "aarch64/pause.tar", "arm");
    write(&src, "aarch64/extra/coredns.tar", "arm");

    let entries = plan(&src, "/root/resource/docker/images", Arch::Aarch64).unwrap();
    assert_eq!(
        dests(&entries),
        vec![
            "/root/resource/docker/images/",
            "/root/resource/docker/images/extra/",
            "/root/resource/docker/images/extra/coredns.tar",
            "/root/resource/docker/images/pause.tar",
            "/root/resource/docker/images/install.sh",
        ]
    );

    let pause = entries
        .iter()
        .find_map(|entry| match entry {
            TransferEntry::File { source, dest, size } if dest.ends_with("pause.tar") => {
                Some((source.clone(), *size))
            }
            _ => None,
        })
        .unwrap();
    assert!(pause.0.ends_with("aarch64/pause.tar"));
    assert_eq!(pause.1, 3);
}

#[test]
fn empty_source_plans_only_the_root() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("helm");
    fs::create_dir_all(&src).unwrap();
    let entries = plan(&src, "/home/ops/resource/helm", Arch::X86_64).unwrap();
    assert_eq!(
        entries,
        vec![TransferEntry::Dir("/home/ops/resource/helm".to_owned())]
    );
}

#[test]
fn files_named_after_an_architecture_keep_their_name() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("kubeadm");
    write(&src, "tools/aarch64", "arm helper");
    write(&src, "x86_64", "plain file");

    let entries = plan(&src, "/r/kubeadm", Arch::Aarch64).unwrap();
    assert_eq!(
        dests(&entries),
        vec![
            "/r/kubeadm/",
            "/r/kubeadm/tools/",
            "/r/kubeadm/tools/aarch64",
            "/r/kubeadm/x86_64",
        ]
    );
}

#[test]
fn directories_precede_their_files() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("calico");
    write(&src, "a/b/c.yaml", "kind: x");
    write(&src, "calico.yaml", "kind: y");
    let entries = plan(&src, "/r/calico", Arch::X86_64).unwrap();
    let position = |needle: &str| dests(&entries).iter().position(|d| d == needle).unwrap();
    assert!(position("/r/calico/") < position("/r/calico/a/"));
    assert!(position("/r/calico/a/") < position("/r/calico/a/b/"));
    assert!(position("/r/calico/a/b/") < position("/r/calico/a/b/c.yaml"));
}

#[test]
fn layout_and_plan_compose_for_os_specific_payloads() {
    let dir = tempdir().unwrap();
    write(dir.path(), "docker/centos/install.sh", "echo centos");
    write(dir.path(), "docker/ubuntu/install.sh", "echo ubuntu");
    let layout = ResourceLayout::new(dir.path());
    let resolved = layout.resolve("docker", OsFamily::Centos).unwrap();
    assert_eq!(resolved.remote, "resource/docker/centos");
    let entries = plan(&resolved.local, "/root/resource/docker/centos", Arch::X86_64).unwrap();
    assert_eq!(
        dests(&entries),
        vec![
            "/root/resource/docker/centos/",
            "/root/resource/docker/centos/install.sh",
        ]
    );
}
