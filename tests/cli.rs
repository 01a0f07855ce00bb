use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn build_scene() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let obj = "\
mtllib cube.mtl
o Cube
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
usemtl Stone
f 1 2 3 4
f 5 8 7 6
f 1 5 6 2
f 2 6 7 3
f 3 7 8 4
f 5 1 4 8
";
    let mtl = "\
newmtl Stone
Ka 0.2 0.2 0.2
Kd 0.7 0.7 0.6
Ns 16
";
    fs::write(dir.path().join("cube.obj"), obj).expect("write obj");
    fs::write(dir.path().join("cube.mtl"), mtl).expect("write mtl");
    dir
}

#[test]
fn cli_prints_scene_summary() {
    let scene = build_scene();
    let mut cmd = Command::cargo_bin("probelit").expect("binary exists");
    cmd.arg(scene.path().join("cube.obj")).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded 1 mesh(es), 8 vertices, 12 triangles"))
        .stdout(contains(" - Cube (12 triangles, material Stone)"))
        .stdout(contains("Bounds: [-1, -1, -1] to [1, 1, 1]"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let scene = build_scene();
    let mut cmd = Command::cargo_bin("probelit").expect("binary exists");
    cmd.arg(scene.path().join("cube.obj")).arg("--frobnicate");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --frobnicate"));
}

#[test]
fn cli_requires_a_scene_path() {
    let mut cmd = Command::cargo_bin("probelit").expect("binary exists");
    cmd.assert().failure().stderr(contains("Usage: probelit"));
}
