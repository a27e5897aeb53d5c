fn main() {
  cfg_aliases::cfg_aliases! {
      linux: { any(target_os = "linux", target_os = "android") },
      apple: { target_vendor = "apple" }
  }
}
