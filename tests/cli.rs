use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::TempDir;
use design_match::DescriptorSet;
use ndarray_npy::write_npy;
use predicates::prelude::*;

const DIM: usize = 16;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

fn basis(i: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.; DIM];
    v[i] = scale;
    v
}

fn write_set<P: AsRef<Path>>(path: P, rows: impl Iterator<Item = Vec<f32>>) -> Result<()> {
    let mut set = DescriptorSet::new(DIM);
    rows.for_each(|row| set.push(&row));
    write_npy(path, &set.to_array())?;
    Ok(())
}

/// 数据目录中有 3 个设计，设计 1 与查询相同
fn data_dir() -> Result<TempDir> {
    let dir = TempDir::new()?;
    let designs = dir.path().join("designs");
    let tests = dir.path().join("test_images");
    fs::create_dir_all(&designs)?;
    fs::create_dir_all(&tests)?;

    write_set(designs.join("0.npy"), (0..DIM).map(|i| basis(i, 100.)))?;
    write_set(designs.join("1.npy"), (0..DIM).map(|i| basis(i, 10.)))?;
    write_set(designs.join("2.npy"), (0..DIM).map(|i| basis(DIM - 1 - i, -50.)))?;
    write_set(tests.join("1.npy"), (0..DIM).map(|i| basis(i, 10.)))?;
    fs::write(dir.path().join("designs.json"), r#"{"1": {"title": "Tide"}}"#)?;
    Ok(dir)
}

#[test]
fn generate_match_evaluate() -> Result<()> {
    let dir = data_dir()?;
    let query = dir.path().join("test_images").join("1.npy");

    cargo_run!("design-match", "-d", dir.path(), "generate", "--suffix", "npy").success();
    for id in 0..3 {
        assert!(dir.path().join("descriptors-3500-3").join(format!("{id}.npy")).is_file());
    }

    cargo_run!("design-match", "-d", dir.path(), "match", &query, "--output-format", "json")
        .success()
        .stdout(predicate::str::contains("\"design_id\": 1"));

    cargo_run!("design-match", "-d", dir.path(), "match", &query, "--coarse", "-j", "2")
        .success()
        .stdout(predicate::str::starts_with("1\t16\t"));

    cargo_run!("design-match", "-d", dir.path(), "evaluate", "--suffix", "npy")
        .success()
        .stdout(predicate::str::contains("accuracy:\t100.00%"));

    Ok(())
}

#[test]
fn generate_skips_existing() -> Result<()> {
    let dir = data_dir()?;
    let descriptors = dir.path().join("descriptors-3500-3");

    cargo_run!("design-match", "-d", dir.path(), "generate", "--suffix", "npy").success();
    fs::write(descriptors.join("1.npy"), b"sentinel")?;

    cargo_run!("design-match", "-d", dir.path(), "generate", "--suffix", "npy").success();
    assert_eq!(fs::read(descriptors.join("1.npy"))?, b"sentinel");

    cargo_run!("design-match", "-d", dir.path(), "generate", "--suffix", "npy", "--overwrite")
        .success();
    assert_ne!(fs::read(descriptors.join("1.npy"))?, b"sentinel");

    Ok(())
}

#[test]
fn match_without_descriptors_fails() -> Result<()> {
    let dir = data_dir()?;
    let query = dir.path().join("test_images").join("1.npy");

    cargo_run!("design-match", "-d", dir.path(), "match", &query)
        .failure()
        .stderr(predicate::str::contains("descriptors-3500-3"));

    Ok(())
}

#[test]
fn invalid_confidence_bounds_rejected() -> Result<()> {
    let dir = data_dir()?;
    let query = dir.path().join("test_images").join("1.npy");

    cargo_run!("design-match", "-d", dir.path(), "generate", "--suffix", "npy").success();
    cargo_run!(
        "design-match",
        "-d",
        dir.path(),
        "match",
        &query,
        "--confidence-low",
        "30",
        "--confidence-high",
        "10"
    )
    .failure();

    Ok(())
}
