use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("satchel")
        .version("1.0.0")
        .author("Satchel Contributors")
        .about("Archive web pages for offline and e-reader reading")
        .arg(
            clap::arg!(-c --config <FILE> "Path to the JSON config file")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(-v --verbose "Enable verbose status output"))
        .subcommand(
            clap::Command::new("add")
                .about("Fetch, rewrite, and store one or more URLs")
                .arg(clap::arg!(<URL>... "URLs to archive"))
                .arg(clap::arg!(--kindle "Also convert each page and mail it to the configured device")),
        )
        .subcommand(
            clap::Command::new("kindle")
                .about("Convert an already-saved page and mail it to the configured device")
                .arg(clap::arg!(<ID> "Page id, as printed by add")),
        )
        .subcommand(
            clap::Command::new("rewrite")
                .about("Run the content rewriter over a local HTML file and print the result")
                .arg(clap::arg!(<FILE> "HTML file to rewrite").value_parser(clap::value_parser!(std::path::PathBuf)))
                .arg(clap::arg!(--url <URL> "Origin URL used to resolve hidden-tag rules"))
                .arg(
                    clap::arg!(--hidden_tags <FILE> "Hidden-tag rule file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(clap::arg!(--download_images "Rewrite image references to local content-hash filenames"))
                .arg(clap::arg!(--images "Print the image filename map after the rewritten HTML")),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "satchel", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "satchel", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "satchel", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "satchel", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
