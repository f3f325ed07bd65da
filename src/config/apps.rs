//! App alias table: Android package names and the names the model may use for them.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Package name to aliases. The first alias is the display name.
pub static PACKAGE_ALIASES: &[(&str, &[&str])] = &[
    // Social & Messaging
    ("com.tencent.mm", &["微信", "WeChat", "wechat"]),
    ("com.tencent.mobileqq", &["QQ"]),
    ("com.sina.weibo", &["微博", "Weibo"]),
    // E-commerce
    ("com.taobao.taobao", &["淘宝", "淘宝闪购", "Taobao"]),
    ("com.jingdong.app.mall", &["京东", "京东秒送", "JD"]),
    ("com.xunmeng.pinduoduo", &["拼多多", "Pinduoduo"]),
    // Lifestyle & Social
    ("com.xingin.xhs", &["小红书", "Xiaohongshu", "RedNote"]),
    ("com.douban.frodo", &["豆瓣", "Douban"]),
    ("com.zhihu.android", &["知乎", "Zhihu"]),
    // Maps & Navigation
    ("com.autonavi.minimap", &["高德地图", "Amap"]),
    ("com.baidu.BaiduMap", &["百度地图", "Baidu Maps"]),
    // Food & Services
    ("com.sankuai.meituan", &["美团", "Meituan"]),
    ("com.dianping.v1", &["大众点评", "Dianping"]),
    ("me.ele", &["饿了么", "Eleme"]),
    ("com.yek.android.kfc.activitys", &["肯德基", "KFC"]),
    // Travel
    ("ctrip.android.view", &["携程", "Ctrip", "Trip.com"]),
    ("com.MobileTicket", &["铁路12306", "12306"]),
    ("com.Qunar", &["去哪儿", "去哪儿旅行", "Qunar"]),
    ("com.sdu.did.psnger", &["滴滴出行", "DiDi"]),
    ("com.booking", &["Booking.com", "Booking", "booking.com", "booking", "BOOKING.COM"]),
    ("com.expedia.bookings", &["Expedia", "expedia"]),
    // Video & Entertainment
    ("tv.danmaku.bili", &["bilibili", "哔哩哔哩", "Bilibili"]),
    ("com.ss.android.ugc.aweme", &["抖音", "Douyin"]),
    ("com.smile.gifmaker", &["快手", "Kuaishou"]),
    ("com.tencent.qqlive", &["腾讯视频", "Tencent Video"]),
    ("com.qiyi.video", &["爱奇艺", "iQIYI"]),
    ("com.youku.phone", &["优酷视频", "Youku"]),
    ("com.hunantv.imgo.activity", &["芒果TV", "Mango TV"]),
    ("com.phoenix.read", &["红果短剧"]),
    ("com.google.android.youtube", &["YouTube", "youtube"]),
    // Music & Audio
    ("com.netease.cloudmusic", &["网易云音乐", "NetEase Cloud Music"]),
    ("com.tencent.qqmusic", &["QQ音乐", "QQ Music"]),
    ("com.luna.music", &["汽水音乐"]),
    ("com.ximalaya.ting.android", &["喜马拉雅", "Ximalaya"]),
    ("com.android.soundrecorder", &["AudioRecorder", "audiorecorder", "录音机"]),
    // Reading
    ("com.dragon.read", &["番茄小说", "番茄免费小说"]),
    ("com.kmxs.reader", &["七猫免费小说"]),
    // Productivity
    ("com.ss.android.lark", &["飞书", "Feishu", "Lark"]),
    ("com.tencent.androidqqmail", &["QQ邮箱", "QQ Mail"]),
    ("com.google.android.gm", &["Gmail", "gmail"]),
    ("com.rammigsoftware.bluecoins", &["Bluecoins", "bluecoins"]),
    ("com.flauschcode.broccoli", &["Broccoli", "broccoli"]),
    ("com.duolingo", &["Duolingo", "duolingo"]),
    // AI & Tools
    ("com.larus.nova", &["豆包", "Doubao"]),
    // Health & Fitness
    ("com.gotokeep.keep", &["keep", "Keep"]),
    ("com.lingan.seeyou", &["美柚"]),
    // News & Information
    ("com.tencent.news", &["腾讯新闻", "Tencent News"]),
    ("com.ss.android.article.news", &["今日头条", "Toutiao"]),
    // Real Estate
    ("com.lianjia.beike", &["贝壳找房"]),
    ("com.anjuke.android.app", &["安居客"]),
    // Finance
    ("com.hexin.plat.android", &["同花顺"]),
    // Games
    ("com.miHoYo.hkrpg", &["崩坏：星穹铁道", "星穹铁道", "Honkai: Star Rail"]),
    ("com.papegames.lysk.cn", &["恋与深空"]),
    // System
    (
        "com.android.settings",
        &[
            "Settings",
            "设置",
            "AndroidSystemSettings",
            "Android System Settings",
            "Android  System Settings",
            "Android-System-Settings",
        ],
    ),
    ("com.android.chrome", &["Chrome", "chrome", "Google Chrome"]),
    ("com.android.deskclock", &["Clock", "clock", "时钟"]),
    ("com.android.contacts", &["Contacts", "contacts", "联系人"]),
    ("com.android.fileexplorer", &["Files", "files", "File Manager", "文件管理"]),
    ("com.google.android.apps.maps", &["Google Maps", "Maps"]),
    ("com.android.camera", &["Camera", "camera", "相机"]),
    ("com.android.gallery3d", &["Gallery", "gallery", "相册"]),
    ("com.android.calculator2", &["Calculator", "calculator", "计算器"]),
    ("com.android.calendar", &["Calendar", "calendar", "日历"]),
    ("com.android.mms", &["Messages", "messages", "短信"]),
    ("com.android.dialer", &["Phone", "phone", "电话"]),
];

static PACKAGE_TO_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| PACKAGE_ALIASES.iter().copied().collect());

static ALIAS_TO_PACKAGE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    PACKAGE_ALIASES
        .iter()
        .flat_map(|(package, aliases)| aliases.iter().map(move |alias| (*alias, *package)))
        .collect()
});

/// Package name for an app alias.
pub fn package_for_alias(alias: &str) -> Option<&'static str> {
    ALIAS_TO_PACKAGE.get(alias).copied()
}

/// All aliases registered for a package.
pub fn aliases_for_package(package: &str) -> Option<&'static [&'static str]> {
    PACKAGE_TO_ALIASES.get(package).copied()
}

/// Display name (first alias) for a package.
pub fn alias_for_package(package: &str) -> Option<&'static str> {
    aliases_for_package(package).and_then(|aliases| aliases.first().copied())
}

/// Display names of every known app, sorted.
pub fn supported_apps() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = PACKAGE_ALIASES
        .iter()
        .filter_map(|(_, aliases)| aliases.first().copied())
        .collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_for_alias() {
        assert_eq!(package_for_alias("微信"), Some("com.tencent.mm"));
        assert_eq!(package_for_alias("Chrome"), Some("com.android.chrome"));
        assert_eq!(package_for_alias("Settings"), Some("com.android.settings"));
        assert_eq!(package_for_alias("NonExistent"), None);
    }

    #[test]
    fn test_alias_for_package_uses_first_alias() {
        assert_eq!(alias_for_package("com.android.settings"), Some("Settings"));
        assert_eq!(alias_for_package("com.booking"), Some("Booking.com"));
        assert_eq!(alias_for_package("com.example.none"), None);
    }

    #[test]
    fn test_every_alias_maps_back_to_its_package() {
        for (package, aliases) in PACKAGE_ALIASES {
            assert!(!aliases.is_empty(), "{} has no aliases", package);
            for alias in aliases.iter() {
                assert_eq!(package_for_alias(alias), Some(*package), "alias {}", alias);
            }
        }
    }

    #[test]
    fn test_supported_apps_sorted_and_unique() {
        let apps = supported_apps();
        assert_eq!(apps.len(), PACKAGE_ALIASES.len());
        assert!(apps.windows(2).all(|w| w[0] < w[1]));
    }
}
